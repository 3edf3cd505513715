//! Creation calls to attribute sets
//!
//! Each creation call decodes into one base attribute set, then expands into
//! `count` copies placed along one axis. Expansion happens before the atomic
//! insert so the store sees every object of the group at once.

use serde_json::{Map, Value};

use super::args::{
    CreateFrameArgs, CreateShapeArgs, CreateStickyNoteArgs, CreateTextArgs, decode,
};
use super::catalog::ToolKind;
use crate::canvas::layout::Axis;
use crate::config::{CanvasConfig, ExecutionConfig};
use crate::constants::canvas as canvas_constants;
use crate::types::{CanvasObjectAttrs, ToolFailure};

/// Approximate glyph width relative to the font size
const GLYPH_WIDTH_RATIO: f64 = 0.6;
const LINE_HEIGHT_RATIO: f64 = 1.5;

/// Attribute sets for one creation call, already expanded
pub fn creation_attrs(
    kind: ToolKind,
    input: &Map<String, Value>,
    canvas: &CanvasConfig,
    execution: &ExecutionConfig,
) -> Result<Vec<CanvasObjectAttrs>, ToolFailure> {
    let tool = kind.as_str();
    let (base, repeat) = match kind {
        ToolKind::CreateShape => {
            let args: CreateShapeArgs = decode(tool, input)?;
            (shape_attrs(&args, canvas), args.repeat)
        }
        ToolKind::CreateText => {
            let args: CreateTextArgs = decode(tool, input)?;
            (text_attrs(&args, canvas), args.repeat)
        }
        ToolKind::CreateStickyNote => {
            let args: CreateStickyNoteArgs = decode(tool, input)?;
            (sticky_attrs(&args, canvas), args.repeat)
        }
        ToolKind::CreateFrame => {
            let args: CreateFrameArgs = decode(tool, input)?;
            (frame_attrs(&args), args.repeat)
        }
        _ => {
            return Err(ToolFailure::invalid_arguments(tool, "not a creation tool"));
        }
    };

    let count = repeat.count.unwrap_or(1);
    if count == 0 || count > execution.max_repeat {
        return Err(ToolFailure::invalid_arguments(
            tool,
            format!("count must be between 1 and {}", execution.max_repeat),
        ));
    }
    Ok(expand(&base, count, repeat.direction, execution.repeat_spacing))
}

/// `count` copies of `base`, each offset by `spacing` times its own size
/// along `direction`. With `spacing >= 1.0` no two copies overlap.
pub fn expand(
    base: &CanvasObjectAttrs,
    count: u32,
    direction: Axis,
    spacing: f64,
) -> Vec<CanvasObjectAttrs> {
    let step = match direction {
        Axis::Horizontal => base.width * spacing,
        Axis::Vertical => base.height * spacing,
    };
    (0..count)
        .map(|i| {
            let mut attrs = base.clone();
            let offset = step * i as f64;
            match direction {
                Axis::Horizontal => attrs.x += offset,
                Axis::Vertical => attrs.y += offset,
            }
            attrs
        })
        .collect()
}

fn position(x: Option<f64>, y: Option<f64>) -> (f64, f64) {
    (
        x.unwrap_or(canvas_constants::DEFAULT_POSITION),
        y.unwrap_or(canvas_constants::DEFAULT_POSITION),
    )
}

fn normalize_shape(shape: &str) -> String {
    match shape.trim().to_ascii_lowercase().as_str() {
        "square" | "rect" | "box" => "rectangle".to_string(),
        "oval" => "ellipse".to_string(),
        "rhombus" => "diamond".to_string(),
        other => other.replace([' ', '-'], "_"),
    }
}

fn shape_attrs(args: &CreateShapeArgs, canvas: &CanvasConfig) -> CanvasObjectAttrs {
    let (x, y) = position(args.x, args.y);
    let object_type = normalize_shape(&args.shape_type);
    let width = args.width.unwrap_or(canvas.default_width);
    // circles stay round unless both sides are given
    let height = match (args.height, object_type.as_str()) {
        (Some(h), _) => h,
        (None, "circle") => width,
        (None, _) => canvas.default_height,
    };
    let mut attrs = CanvasObjectAttrs::new(object_type, x, y, width, height).with_property(
        "color",
        args.color.as_deref().unwrap_or(&canvas.default_color),
    );
    if let Some(label) = &args.label {
        attrs = attrs.with_property("text", label.as_str());
    }
    attrs
}

fn text_attrs(args: &CreateTextArgs, canvas: &CanvasConfig) -> CanvasObjectAttrs {
    let (x, y) = position(args.x, args.y);
    let font_size = args
        .font_size
        .filter(|s| s.is_finite() && *s > 0.0)
        .unwrap_or(canvas.default_font_size);
    let chars = args.text.chars().count().max(1) as f64;
    CanvasObjectAttrs::new(
        "text",
        x,
        y,
        (chars * font_size * GLYPH_WIDTH_RATIO).ceil(),
        (font_size * LINE_HEIGHT_RATIO).ceil(),
    )
    .with_property("text", args.text.as_str())
    .with_property("fontSize", font_size)
    .with_property(
        "color",
        args.color.as_deref().unwrap_or(&canvas.default_text_color),
    )
}

fn sticky_attrs(args: &CreateStickyNoteArgs, canvas: &CanvasConfig) -> CanvasObjectAttrs {
    let (x, y) = position(args.x, args.y);
    CanvasObjectAttrs::new(
        "sticky_note",
        x,
        y,
        canvas.sticky_note_size,
        canvas.sticky_note_size,
    )
    .with_property("text", args.text.as_str())
    .with_property(
        "color",
        args.color.as_deref().unwrap_or(&canvas.default_sticky_color),
    )
}

fn frame_attrs(args: &CreateFrameArgs) -> CanvasObjectAttrs {
    let (x, y) = position(args.x, args.y);
    let mut attrs = CanvasObjectAttrs::new(
        "frame",
        x,
        y,
        args.width.unwrap_or(canvas_constants::DEFAULT_FRAME_WIDTH),
        args.height.unwrap_or(canvas_constants::DEFAULT_FRAME_HEIGHT),
    )
    .with_property("title", args.title.as_deref().unwrap_or("Frame"));
    // frames paint beneath their contents
    attrs.z_index = Some(-1);
    if let Some(color) = &args.color {
        attrs = attrs.with_property("color", color.as_str());
    }
    attrs
}
