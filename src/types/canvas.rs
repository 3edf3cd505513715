//! Canvas object model shared by the tool layer and the canvas stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Object types a store accepts
pub const KNOWN_OBJECT_TYPES: &[&str] = &[
    "rectangle",
    "ellipse",
    "circle",
    "triangle",
    "diamond",
    "line",
    "text",
    "sticky_note",
    "frame",
    "connector",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Attribute set a creation call produces for one object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasObjectAttrs {
    #[serde(rename = "type")]
    pub object_type: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Free-form visual properties (color, text, font size, ...)
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CanvasObjectAttrs {
    pub fn new(object_type: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            object_type: object_type.into(),
            x,
            y,
            width,
            height,
            rotation: 0.0,
            z_index: None,
            group_id: None,
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    pub fn bounds(&self) -> Bounds {
        Bounds {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

/// Committed canvas object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasObject {
    pub id: String,
    pub canvas_id: String,
    #[serde(flatten)]
    pub attrs: CanvasObjectAttrs,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanvasObject {
    pub fn from_attrs(canvas_id: &str, attrs: CanvasObjectAttrs) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            canvas_id: canvas_id.to_string(),
            attrs,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn bounds(&self) -> Bounds {
        self.attrs.bounds()
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &ObjectPatch) {
        if let Some(x) = patch.x {
            self.attrs.x = x;
        }
        if let Some(y) = patch.y {
            self.attrs.y = y;
        }
        if let Some(width) = patch.width {
            self.attrs.width = width;
        }
        if let Some(height) = patch.height {
            self.attrs.height = height;
        }
        if let Some(rotation) = patch.rotation {
            self.attrs.rotation = rotation.rem_euclid(360.0);
        }
        if let Some(z_index) = patch.z_index {
            self.attrs.z_index = Some(z_index);
        }
        if let Some(group_id) = &patch.group_id {
            self.attrs.group_id = Some(group_id.clone());
        }
        for (key, value) in &patch.properties {
            if value.is_null() {
                self.attrs.properties.remove(key);
            } else {
                self.attrs.properties.insert(key.clone(), value.clone());
            }
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update; `None` leaves the field untouched.
///
/// Property entries are merged; a `null` value removes the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub z_index: Option<i64>,
    pub group_id: Option<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ObjectPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }

    pub fn size(width: f64, height: f64) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            ..Default::default()
        }
    }

    pub fn rotation(degrees: f64) -> Self {
        Self {
            rotation: Some(degrees),
            ..Default::default()
        }
    }

    pub fn properties(properties: Map<String, Value>) -> Self {
        Self {
            properties,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_none()
            && self.y.is_none()
            && self.width.is_none()
            && self.height.is_none()
            && self.rotation.is_none()
            && self.z_index.is_none()
            && self.group_id.is_none()
            && self.properties.is_empty()
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f64 {
        self.y + self.height / 2.0
    }

    /// Strict interior overlap; touching edges do not count
    pub fn overlaps(&self, other: &Bounds) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}
