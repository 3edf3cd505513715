//! Geometric layout helpers
//!
//! Stateless placement functions over bounding boxes. Every function returns
//! one top-left position per input item, in input order, rounded to whole
//! pixels.

use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::types::Bounds;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    fn rounded(x: f64, y: f64) -> Self {
        Self {
            x: x.round(),
            y: y.round(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignEdge {
    Left,
    Right,
    Top,
    Bottom,
    /// Shared vertical center line
    CenterHorizontal,
    /// Shared horizontal center line
    CenterVertical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    #[default]
    Horizontal,
    Vertical,
}

/// Union box of all items
pub fn bounding_box(items: &[Bounds]) -> Option<Bounds> {
    let first = items.first()?;
    let (mut left, mut top, mut right, mut bottom) =
        (first.x, first.y, first.right(), first.bottom());
    for b in &items[1..] {
        left = left.min(b.x);
        top = top.min(b.y);
        right = right.max(b.right());
        bottom = bottom.max(b.bottom());
    }
    Some(Bounds {
        x: left,
        y: top,
        width: right - left,
        height: bottom - top,
    })
}

/// Uniform cells sized to the largest item, filled row by row
pub fn grid(items: &[Bounds], origin: Point, columns: usize, spacing: f64) -> Vec<Point> {
    let columns = columns.max(1);
    let cell_w = items.iter().map(|b| b.width).fold(0.0, f64::max);
    let cell_h = items.iter().map(|b| b.height).fold(0.0, f64::max);
    (0..items.len())
        .map(|i| {
            let (row, col) = (i / columns, i % columns);
            Point::rounded(
                origin.x + col as f64 * (cell_w + spacing),
                origin.y + row as f64 * (cell_h + spacing),
            )
        })
        .collect()
}

pub fn row(items: &[Bounds], origin: Point, spacing: f64) -> Vec<Point> {
    let mut x = origin.x;
    items
        .iter()
        .map(|b| {
            let p = Point::rounded(x, origin.y);
            x += b.width + spacing;
            p
        })
        .collect()
}

pub fn column(items: &[Bounds], origin: Point, spacing: f64) -> Vec<Point> {
    let mut y = origin.y;
    items
        .iter()
        .map(|b| {
            let p = Point::rounded(origin.x, y);
            y += b.height + spacing;
            p
        })
        .collect()
}

/// Item centers evenly spaced on a circle, first item at 12 o'clock
pub fn circle(items: &[Bounds], center: Point, radius: f64) -> Vec<Point> {
    let n = items.len().max(1) as f64;
    items
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let angle = TAU * i as f64 / n - TAU / 4.0;
            Point::rounded(
                center.x + radius * angle.cos() - b.width / 2.0,
                center.y + radius * angle.sin() - b.height / 2.0,
            )
        })
        .collect()
}

/// Align every item to one edge (or center line) of the group's union box
pub fn align(items: &[Bounds], edge: AlignEdge) -> Vec<Point> {
    let Some(union) = bounding_box(items) else {
        return Vec::new();
    };
    items
        .iter()
        .map(|b| match edge {
            AlignEdge::Left => Point::rounded(union.x, b.y),
            AlignEdge::Right => Point::rounded(union.right() - b.width, b.y),
            AlignEdge::Top => Point::rounded(b.x, union.y),
            AlignEdge::Bottom => Point::rounded(b.x, union.bottom() - b.height),
            AlignEdge::CenterHorizontal => Point::rounded(union.center_x() - b.width / 2.0, b.y),
            AlignEdge::CenterVertical => Point::rounded(b.x, union.center_y() - b.height / 2.0),
        })
        .collect()
}

/// Equal gaps between neighbours along an axis.
///
/// The outermost items stay put; fewer than three items are left unchanged.
pub fn distribute(items: &[Bounds], axis: Axis) -> Vec<Point> {
    let unchanged: Vec<Point> = items.iter().map(|b| Point::rounded(b.x, b.y)).collect();
    if items.len() < 3 {
        return unchanged;
    }

    let start = |b: &Bounds| match axis {
        Axis::Horizontal => b.x,
        Axis::Vertical => b.y,
    };
    let extent = |b: &Bounds| match axis {
        Axis::Horizontal => b.width,
        Axis::Vertical => b.height,
    };

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| start(&items[a]).total_cmp(&start(&items[b])));

    let first = &items[order[0]];
    let last = &items[order[order.len() - 1]];
    let span = start(last) + extent(last) - start(first);
    let occupied: f64 = items.iter().map(extent).sum();
    let gap = (span - occupied) / (items.len() - 1) as f64;

    let mut positions = unchanged;
    let mut cursor = start(first);
    for &index in &order {
        let b = &items[index];
        positions[index] = match axis {
            Axis::Horizontal => Point::rounded(cursor, b.y),
            Axis::Vertical => Point::rounded(b.x, cursor),
        };
        cursor += extent(b) + gap;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(x: f64, y: f64, w: f64, h: f64) -> Bounds {
        Bounds {
            x,
            y,
            width: w,
            height: h,
        }
    }

    #[test]
    fn test_grid_wraps_rows() {
        let items = vec![b(0.0, 0.0, 40.0, 20.0); 5];
        let points = grid(&items, Point { x: 10.0, y: 10.0 }, 2, 10.0);
        assert_eq!(points[0], Point { x: 10.0, y: 10.0 });
        assert_eq!(points[1], Point { x: 60.0, y: 10.0 });
        assert_eq!(points[2], Point { x: 10.0, y: 40.0 });
        assert_eq!(points[4], Point { x: 10.0, y: 70.0 });
    }

    #[test]
    fn test_row_and_column() {
        let items = vec![b(0.0, 0.0, 30.0, 10.0), b(0.0, 0.0, 50.0, 20.0)];
        let r = row(&items, Point { x: 0.0, y: 5.0 }, 20.0);
        assert_eq!(r[1], Point { x: 50.0, y: 5.0 });
        let c = column(&items, Point { x: 0.0, y: 0.0 }, 20.0);
        assert_eq!(c[1], Point { x: 0.0, y: 30.0 });
    }

    #[test]
    fn test_align_within_one_pixel() {
        let items = vec![
            b(10.3, 0.0, 20.0, 20.0),
            b(47.0, 30.0, 33.0, 10.0),
            b(25.0, 60.0, 7.0, 7.0),
        ];
        let left = align(&items, AlignEdge::Left);
        assert!(left.iter().all(|p| (p.x - 10.3).abs() <= 1.0));

        let right = align(&items, AlignEdge::Right);
        for (p, item) in right.iter().zip(&items) {
            assert!((p.x + item.width - 80.0).abs() <= 1.0);
        }

        let centered = align(&items, AlignEdge::CenterHorizontal);
        for (p, item) in centered.iter().zip(&items) {
            assert!((p.x + item.width / 2.0 - 45.15).abs() <= 1.0);
        }
    }

    #[test]
    fn test_distribute_equal_gaps() {
        let items = vec![
            b(0.0, 0.0, 10.0, 10.0),
            b(100.0, 0.0, 10.0, 10.0),
            b(15.0, 0.0, 30.0, 10.0),
        ];
        let points = distribute(&items, Axis::Horizontal);
        // span 110, occupied 50, gap 30
        assert_eq!(points[0].x, 0.0);
        assert_eq!(points[2].x, 40.0);
        assert_eq!(points[1].x, 100.0);
    }

    #[test]
    fn test_distribute_leaves_pairs_alone() {
        let items = vec![b(3.0, 4.0, 1.0, 1.0), b(50.0, 4.0, 1.0, 1.0)];
        assert_eq!(distribute(&items, Axis::Vertical)[1], Point { x: 50.0, y: 4.0 });
    }

    #[test]
    fn test_circle_places_first_at_top() {
        let items = vec![b(0.0, 0.0, 20.0, 20.0); 4];
        let points = circle(&items, Point { x: 100.0, y: 100.0 }, 50.0);
        assert_eq!(points[0], Point { x: 90.0, y: 40.0 });
        assert_eq!(points[1], Point { x: 140.0, y: 90.0 });
    }

    #[test]
    fn test_bounding_box() {
        assert!(bounding_box(&[]).is_none());
        let union = bounding_box(&[b(0.0, 0.0, 10.0, 10.0), b(20.0, 5.0, 5.0, 20.0)]).unwrap();
        assert_eq!((union.width, union.height), (25.0, 25.0));
    }
}
