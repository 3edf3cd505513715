//! Tool catalogue
//!
//! The static `{name, description, inputSchema}` list sent with every provider
//! call. Creation tools are the set the batch processor groups into one
//! atomic insert.

use serde_json::{Value, json};
use std::sync::Arc;

use crate::types::ToolDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    CreateShape,
    CreateText,
    CreateStickyNote,
    CreateFrame,
    CreateConnector,
    MoveObject,
    ResizeObject,
    RotateObject,
    DeleteObject,
    UpdateStyle,
    UpdateText,
    GroupObjects,
    ArrangeObjects,
    AlignObjects,
    DistributeObjects,
    SelectObjects,
    GetCanvasState,
}

impl ToolKind {
    pub const ALL: [ToolKind; 17] = [
        Self::CreateShape,
        Self::CreateText,
        Self::CreateStickyNote,
        Self::CreateFrame,
        Self::CreateConnector,
        Self::MoveObject,
        Self::ResizeObject,
        Self::RotateObject,
        Self::DeleteObject,
        Self::UpdateStyle,
        Self::UpdateText,
        Self::GroupObjects,
        Self::ArrangeObjects,
        Self::AlignObjects,
        Self::DistributeObjects,
        Self::SelectObjects,
        Self::GetCanvasState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateShape => "create_shape",
            Self::CreateText => "create_text",
            Self::CreateStickyNote => "create_sticky_note",
            Self::CreateFrame => "create_frame",
            Self::CreateConnector => "create_connector",
            Self::MoveObject => "move_object",
            Self::ResizeObject => "resize_object",
            Self::RotateObject => "rotate_object",
            Self::DeleteObject => "delete_object",
            Self::UpdateStyle => "update_style",
            Self::UpdateText => "update_text",
            Self::GroupObjects => "group_objects",
            Self::ArrangeObjects => "arrange_objects",
            Self::AlignObjects => "align_objects",
            Self::DistributeObjects => "distribute_objects",
            Self::SelectObjects => "select_objects",
            Self::GetCanvasState => "get_canvas_state",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Independent, side-effect-free creations eligible for the atomic batch
    pub fn is_creation(&self) -> bool {
        matches!(
            self,
            Self::CreateShape | Self::CreateText | Self::CreateStickyNote | Self::CreateFrame
        )
    }

    fn description(&self) -> &'static str {
        match self {
            Self::CreateShape => {
                "Create a shape. Use `count` (with optional `direction`) to create several identical shapes in a line."
            }
            Self::CreateText => "Create a text label.",
            Self::CreateStickyNote => "Create a sticky note with text.",
            Self::CreateFrame => "Create a frame that visually contains other objects.",
            Self::CreateConnector => "Draw a connector line between two existing objects.",
            Self::MoveObject => "Move an object so its top-left corner is at (x, y).",
            Self::ResizeObject => "Set an object's width and height.",
            Self::RotateObject => "Set an object's rotation in degrees.",
            Self::DeleteObject => "Delete an object.",
            Self::UpdateStyle => "Change an object's colors, stroke, opacity or font size.",
            Self::UpdateText => "Replace the text of a text object or sticky note.",
            Self::GroupObjects => "Group objects so they move together.",
            Self::ArrangeObjects => "Lay objects out as a grid, row, column or circle.",
            Self::AlignObjects => "Align objects to a shared edge or center line.",
            Self::DistributeObjects => "Space objects evenly along an axis.",
            Self::SelectObjects => "Select objects by id, type or color.",
            Self::GetCanvasState => "Return every object currently on the canvas.",
        }
    }

    fn input_schema(&self) -> Value {
        let position = json!({
            "x": {"type": "number"},
            "y": {"type": "number"}
        });
        let repeat = json!({
            "count": {"type": "integer", "minimum": 1, "description": "Number of copies"},
            "direction": {"type": "string", "enum": ["horizontal", "vertical"]}
        });
        let object_id = json!({"objectId": {"type": "string"}});
        let object_ids = json!({"objectIds": {"type": "array", "items": {"type": "string"}}});

        let (properties, required): (Value, Vec<&str>) = match self {
            Self::CreateShape => (
                merge(&[
                    json!({
                        "shapeType": {"type": "string", "enum": ["rectangle", "ellipse", "circle", "triangle", "diamond", "line"]},
                        "width": {"type": "number"},
                        "height": {"type": "number"},
                        "color": {"type": "string"},
                        "label": {"type": "string"}
                    }),
                    position,
                    repeat,
                ]),
                vec!["shapeType"],
            ),
            Self::CreateText => (
                merge(&[
                    json!({
                        "text": {"type": "string"},
                        "fontSize": {"type": "number"},
                        "color": {"type": "string"}
                    }),
                    position,
                    repeat,
                ]),
                vec!["text"],
            ),
            Self::CreateStickyNote => (
                merge(&[
                    json!({"text": {"type": "string"}, "color": {"type": "string"}}),
                    position,
                    repeat,
                ]),
                vec!["text"],
            ),
            Self::CreateFrame => (
                merge(&[
                    json!({
                        "title": {"type": "string"},
                        "width": {"type": "number"},
                        "height": {"type": "number"},
                        "color": {"type": "string"}
                    }),
                    position,
                    repeat,
                ]),
                vec![],
            ),
            Self::CreateConnector => (
                json!({
                    "fromId": {"type": "string"},
                    "toId": {"type": "string"},
                    "color": {"type": "string"}
                }),
                vec!["fromId", "toId"],
            ),
            Self::MoveObject => (merge(&[object_id, position]), vec!["objectId", "x", "y"]),
            Self::ResizeObject => (
                merge(&[
                    object_id,
                    json!({"width": {"type": "number"}, "height": {"type": "number"}}),
                ]),
                vec!["objectId", "width", "height"],
            ),
            Self::RotateObject => (
                merge(&[object_id, json!({"degrees": {"type": "number"}})]),
                vec!["objectId", "degrees"],
            ),
            Self::DeleteObject => (object_id, vec!["objectId"]),
            Self::UpdateStyle => (
                merge(&[
                    object_id,
                    json!({
                        "color": {"type": "string"},
                        "strokeColor": {"type": "string"},
                        "strokeWidth": {"type": "number"},
                        "opacity": {"type": "number", "minimum": 0, "maximum": 1},
                        "fontSize": {"type": "number"}
                    }),
                ]),
                vec!["objectId"],
            ),
            Self::UpdateText => (
                merge(&[object_id, json!({"text": {"type": "string"}})]),
                vec!["objectId", "text"],
            ),
            Self::GroupObjects => (
                merge(&[object_ids, json!({"groupId": {"type": "string"}})]),
                vec!["objectIds"],
            ),
            Self::ArrangeObjects => (
                merge(&[
                    object_ids,
                    position,
                    json!({
                        "layout": {"type": "string", "enum": ["grid", "row", "column", "circle"]},
                        "columns": {"type": "integer", "minimum": 1},
                        "spacing": {"type": "number"},
                        "radius": {"type": "number"}
                    }),
                ]),
                vec!["objectIds", "layout"],
            ),
            Self::AlignObjects => (
                merge(&[
                    object_ids,
                    json!({"edge": {"type": "string", "enum": ["left", "right", "top", "bottom", "center_horizontal", "center_vertical"]}}),
                ]),
                vec!["objectIds", "edge"],
            ),
            Self::DistributeObjects => (
                merge(&[
                    object_ids,
                    json!({"axis": {"type": "string", "enum": ["horizontal", "vertical"]}}),
                ]),
                vec!["objectIds"],
            ),
            Self::SelectObjects => (
                merge(&[
                    object_ids,
                    json!({"objectType": {"type": "string"}, "color": {"type": "string"}}),
                ]),
                vec![],
            ),
            Self::GetCanvasState => (json!({}), vec![]),
        };

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.as_str().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}

fn merge(parts: &[Value]) -> Value {
    let mut merged = serde_json::Map::new();
    for part in parts {
        if let Value::Object(map) = part {
            merged.extend(map.clone());
        }
    }
    Value::Object(merged)
}

/// Registered tools and their definitions
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    definitions: Arc<[ToolDefinition]>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl ToolCatalog {
    pub fn standard() -> Self {
        Self {
            definitions: ToolKind::ALL.iter().map(ToolKind::definition).collect(),
        }
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Cheap handle for spawned provider calls
    pub fn shared_definitions(&self) -> Arc<[ToolDefinition]> {
        Arc::clone(&self.definitions)
    }

    pub fn is_registered(&self, name: &str) -> bool {
        ToolKind::parse(name).is_some()
    }

    pub fn is_creation(&self, name: &str) -> bool {
        ToolKind::parse(name).is_some_and(|k| k.is_creation())
    }

    pub fn creation_tools(&self) -> Vec<&'static str> {
        ToolKind::ALL
            .iter()
            .filter(|k| k.is_creation())
            .map(ToolKind::as_str)
            .collect()
    }
}
