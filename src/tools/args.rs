//! Per-tool typed argument decoding
//!
//! Structural validation only guarantees `input` is an object; each tool
//! decodes it into its own struct at execution time. Unknown keys are
//! ignored, wrong or missing ones become `InvalidArguments`.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::canvas::layout::{AlignEdge, Axis};
use crate::types::ToolFailure;

pub fn decode<T: DeserializeOwned>(tool: &str, input: &Map<String, Value>) -> Result<T, ToolFailure> {
    serde_json::from_value(Value::Object(input.clone()))
        .map_err(|e| ToolFailure::invalid_arguments(tool, e.to_string()))
}

/// Optional repetition shared by every creation tool
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repeat {
    pub count: Option<u32>,
    #[serde(default)]
    pub direction: Axis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateShapeArgs {
    #[serde(alias = "shape", alias = "type")]
    pub shape_type: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub color: Option<String>,
    pub label: Option<String>,
    #[serde(flatten)]
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTextArgs {
    pub text: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub font_size: Option<f64>,
    pub color: Option<String>,
    #[serde(flatten)]
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStickyNoteArgs {
    pub text: String,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub color: Option<String>,
    #[serde(flatten)]
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFrameArgs {
    pub title: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub color: Option<String>,
    #[serde(flatten)]
    pub repeat: Repeat,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConnectorArgs {
    pub from_id: String,
    pub to_id: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    #[serde(alias = "id")]
    pub object_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveObjectArgs {
    #[serde(alias = "id")]
    pub object_id: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeObjectArgs {
    #[serde(alias = "id")]
    pub object_id: String,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateObjectArgs {
    #[serde(alias = "id")]
    pub object_id: String,
    #[serde(alias = "rotation", alias = "angle")]
    pub degrees: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStyleArgs {
    #[serde(alias = "id")]
    pub object_id: String,
    pub color: Option<String>,
    pub stroke_color: Option<String>,
    pub stroke_width: Option<f64>,
    pub opacity: Option<f64>,
    pub font_size: Option<f64>,
}

impl UpdateStyleArgs {
    /// Requested style changes as object properties
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        if let Some(color) = &self.color {
            props.insert("color".into(), Value::from(color.as_str()));
        }
        if let Some(stroke) = &self.stroke_color {
            props.insert("strokeColor".into(), Value::from(stroke.as_str()));
        }
        if let Some(width) = self.stroke_width {
            props.insert("strokeWidth".into(), Value::from(width));
        }
        if let Some(opacity) = self.opacity {
            props.insert("opacity".into(), Value::from(opacity.clamp(0.0, 1.0)));
        }
        if let Some(size) = self.font_size {
            props.insert("fontSize".into(), Value::from(size));
        }
        props
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTextArgs {
    #[serde(alias = "id")]
    pub object_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupObjectsArgs {
    #[serde(alias = "ids")]
    pub object_ids: Vec<String>,
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrangeLayout {
    Grid,
    Row,
    Column,
    Circle,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangeObjectsArgs {
    #[serde(alias = "ids")]
    pub object_ids: Vec<String>,
    pub layout: ArrangeLayout,
    pub columns: Option<usize>,
    pub spacing: Option<f64>,
    pub radius: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlignObjectsArgs {
    #[serde(alias = "ids")]
    pub object_ids: Vec<String>,
    #[serde(alias = "alignment")]
    pub edge: AlignEdge,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributeObjectsArgs {
    #[serde(alias = "ids")]
    pub object_ids: Vec<String>,
    #[serde(default, alias = "direction")]
    pub axis: Axis,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectObjectsArgs {
    #[serde(default, alias = "ids")]
    pub object_ids: Vec<String>,
    #[serde(alias = "type")]
    pub object_type: Option<String>,
    pub color: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use serde_json::json;

    fn input(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_shape_with_repeat() {
        let args: CreateShapeArgs = decode(
            "create_shape",
            &input(json!({"shapeType": "rectangle", "width": 50, "height": 30, "count": 5, "color": "red"})),
        )
        .unwrap();
        assert_eq!(args.shape_type, "rectangle");
        assert_eq!(args.repeat.count, Some(5));
        assert_eq!(args.repeat.direction, Axis::Horizontal);
        assert_eq!(args.width, Some(50.0));
    }

    #[test]
    fn test_aliases_are_accepted() {
        let args: CreateShapeArgs =
            decode("create_shape", &input(json!({"type": "ellipse", "direction": "vertical", "count": 2})))
                .unwrap();
        assert_eq!(args.shape_type, "ellipse");
        assert_eq!(args.repeat.direction, Axis::Vertical);

        let rotate: RotateObjectArgs =
            decode("rotate_object", &input(json!({"id": "a", "angle": 45}))).unwrap();
        assert_eq!(rotate.degrees, 45.0);
    }

    #[test]
    fn test_missing_argument_is_invalid_arguments() {
        let err = decode::<MoveObjectArgs>("move_object", &input(json!({"objectId": "a", "x": 1})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
        assert!(err.message.contains("move_object"));
    }

    #[test]
    fn test_style_properties() {
        let args: UpdateStyleArgs = decode(
            "update_style",
            &input(json!({"objectId": "a", "color": "blue", "opacity": 3.0})),
        )
        .unwrap();
        let props = args.properties();
        assert_eq!(props["color"], json!("blue"));
        assert_eq!(props["opacity"], json!(1.0));
        assert!(!props.contains_key("strokeColor"));
    }

    #[test]
    fn test_layout_enums() {
        let args: AlignObjectsArgs = decode(
            "align_objects",
            &input(json!({"objectIds": ["a", "b"], "edge": "center_vertical"})),
        )
        .unwrap();
        assert_eq!(args.edge, AlignEdge::CenterVertical);

        assert!(decode::<ArrangeObjectsArgs>(
            "arrange_objects",
            &input(json!({"objectIds": [], "layout": "spiral"}))
        )
        .is_err());
    }
}
