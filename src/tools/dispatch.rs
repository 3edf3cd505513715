//! Per-name dispatch of individual tool calls
//!
//! Every call yields exactly one `ToolOutcome`; failures are local to that
//! call. Mutations are republished on the event bus once committed.

use futures::future::try_join_all;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::args::{
    AlignObjectsArgs, ArrangeLayout, ArrangeObjectsArgs, CreateConnectorArgs, DistributeObjectsArgs,
    GroupObjectsArgs, MoveObjectArgs, ObjectRef, ResizeObjectArgs, RotateObjectArgs,
    SelectObjectsArgs, UpdateStyleArgs, UpdateTextArgs, decode,
};
use super::catalog::ToolKind;
use super::creation::creation_attrs;
use crate::canvas::layout::{self, Point};
use crate::canvas::{CanvasEvent, CanvasEventBus, SharedStore};
use crate::config::{CanvasConfig, ExecutionConfig};
use crate::types::{
    CanvasObject, CanvasObjectAttrs, ObjectPatch, ToolCall, ToolFailure, ToolOutcome,
};

type ToolResult = Result<Value, ToolFailure>;

pub struct ToolDispatcher {
    store: SharedStore,
    events: CanvasEventBus,
    canvas: CanvasConfig,
    execution: ExecutionConfig,
}

impl ToolDispatcher {
    pub fn new(
        store: SharedStore,
        events: CanvasEventBus,
        canvas: CanvasConfig,
        execution: ExecutionConfig,
    ) -> Self {
        Self {
            store,
            events,
            canvas,
            execution,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn events(&self) -> &CanvasEventBus {
        &self.events
    }

    pub fn canvas_config(&self) -> &CanvasConfig {
        &self.canvas
    }

    pub fn execution_config(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// Execute one call; never fails as a whole
    pub async fn execute(&self, canvas_id: &str, call: &ToolCall) -> ToolOutcome {
        let Some(kind) = ToolKind::parse(&call.name) else {
            return ToolFailure::unknown_tool(&call.name).into();
        };
        debug!(tool = %call.name, id = %call.id, "Executing tool call");
        match self.run(kind, canvas_id, &call.input).await {
            Ok(data) => ToolOutcome::success(data),
            Err(failure) => {
                debug!(tool = %call.name, error = %failure, "Tool call failed");
                failure.into()
            }
        }
    }

    async fn run(&self, kind: ToolKind, canvas_id: &str, input: &Map<String, Value>) -> ToolResult {
        let tool = kind.as_str();
        match kind {
            ToolKind::CreateShape
            | ToolKind::CreateText
            | ToolKind::CreateStickyNote
            | ToolKind::CreateFrame => {
                let attrs = creation_attrs(kind, input, &self.canvas, &self.execution)?;
                let created = self.create(canvas_id, attrs).await?;
                Ok(created_data(&created))
            }
            ToolKind::CreateConnector => {
                let args: CreateConnectorArgs = decode(tool, input)?;
                self.create_connector(canvas_id, args).await
            }
            ToolKind::MoveObject => {
                let args: MoveObjectArgs = decode(tool, input)?;
                let patch = ObjectPatch::position(args.x, args.y);
                self.update(canvas_id, &args.object_id, &patch).await
            }
            ToolKind::ResizeObject => {
                let args: ResizeObjectArgs = decode(tool, input)?;
                let patch = ObjectPatch::size(args.width, args.height);
                self.update(canvas_id, &args.object_id, &patch).await
            }
            ToolKind::RotateObject => {
                let args: RotateObjectArgs = decode(tool, input)?;
                let patch = ObjectPatch::rotation(args.degrees);
                self.update(canvas_id, &args.object_id, &patch).await
            }
            ToolKind::DeleteObject => {
                let args: ObjectRef = decode(tool, input)?;
                self.store.delete_object(canvas_id, &args.object_id).await?;
                self.events.publish(CanvasEvent::ObjectDeleted {
                    canvas_id: canvas_id.to_string(),
                    object_id: args.object_id.clone(),
                });
                Ok(json!({ "deletedId": args.object_id }))
            }
            ToolKind::UpdateStyle => {
                let args: UpdateStyleArgs = decode(tool, input)?;
                let properties = args.properties();
                if properties.is_empty() {
                    return Err(ToolFailure::invalid_arguments(tool, "no style given"));
                }
                self.update(canvas_id, &args.object_id, &ObjectPatch::properties(properties))
                    .await
            }
            ToolKind::UpdateText => {
                let args: UpdateTextArgs = decode(tool, input)?;
                let mut properties = Map::new();
                properties.insert("text".into(), Value::String(args.text));
                self.update(canvas_id, &args.object_id, &ObjectPatch::properties(properties))
                    .await
            }
            ToolKind::GroupObjects => {
                let args: GroupObjectsArgs = decode(tool, input)?;
                require_ids(tool, &args.object_ids, 2)?;
                let grouped = self
                    .store
                    .group_objects(canvas_id, &args.object_ids, args.group_id)
                    .await?;
                for object in &grouped.objects {
                    self.publish_update(canvas_id, object);
                }
                Ok(json!({ "groupId": grouped.group_id, "objectIds": args.object_ids }))
            }
            ToolKind::ArrangeObjects => {
                let args: ArrangeObjectsArgs = decode(tool, input)?;
                self.arrange(canvas_id, args).await
            }
            ToolKind::AlignObjects => {
                let args: AlignObjectsArgs = decode(tool, input)?;
                require_ids(tool, &args.object_ids, 2)?;
                let objects = self.load_all(canvas_id, &args.object_ids).await?;
                let points = layout::align(&bounds_of(&objects), args.edge);
                self.place(canvas_id, &objects, &points).await
            }
            ToolKind::DistributeObjects => {
                let args: DistributeObjectsArgs = decode(tool, input)?;
                require_ids(tool, &args.object_ids, 3)?;
                let objects = self.load_all(canvas_id, &args.object_ids).await?;
                let points = layout::distribute(&bounds_of(&objects), args.axis);
                self.place(canvas_id, &objects, &points).await
            }
            ToolKind::SelectObjects => {
                let args: SelectObjectsArgs = decode(tool, input)?;
                self.select(canvas_id, args).await
            }
            ToolKind::GetCanvasState => {
                let objects = self.store.list_objects(canvas_id).await?;
                Ok(json!({
                    "canvasId": canvas_id,
                    "objectCount": objects.len(),
                    "objects": objects,
                }))
            }
        }
    }

    /// Atomic insert plus fan-out
    pub(crate) async fn create(
        &self,
        canvas_id: &str,
        attrs: Vec<CanvasObjectAttrs>,
    ) -> Result<Vec<CanvasObject>, crate::canvas::StoreError> {
        let created = self.store.create_objects_batch(canvas_id, attrs).await?;
        self.events.publish(CanvasEvent::ObjectsCreated {
            canvas_id: canvas_id.to_string(),
            objects: created.clone(),
        });
        Ok(created)
    }

    async fn update(&self, canvas_id: &str, object_id: &str, patch: &ObjectPatch) -> ToolResult {
        let object = self.store.update_object(canvas_id, object_id, patch).await?;
        self.publish_update(canvas_id, &object);
        Ok(json!({ "object": object }))
    }

    fn publish_update(&self, canvas_id: &str, object: &CanvasObject) {
        self.events.publish(CanvasEvent::ObjectUpdated {
            canvas_id: canvas_id.to_string(),
            object: object.clone(),
        });
    }

    async fn load_all(&self, canvas_id: &str, ids: &[String]) -> Result<Vec<CanvasObject>, ToolFailure> {
        let loads = ids.iter().map(|id| self.store.get_object(canvas_id, id));
        Ok(try_join_all(loads).await?)
    }

    /// Move each object to its computed position
    async fn place(&self, canvas_id: &str, objects: &[CanvasObject], points: &[Point]) -> ToolResult {
        let mut placed = Vec::with_capacity(objects.len());
        for (object, point) in objects.iter().zip(points) {
            let updated = self
                .store
                .move_object(canvas_id, &object.id, point.x, point.y)
                .await?;
            self.publish_update(canvas_id, &updated);
            placed.push(json!({ "id": updated.id, "x": updated.attrs.x, "y": updated.attrs.y }));
        }
        Ok(json!({ "placed": placed }))
    }

    async fn arrange(&self, canvas_id: &str, args: ArrangeObjectsArgs) -> ToolResult {
        require_ids(ToolKind::ArrangeObjects.as_str(), &args.object_ids, 1)?;
        let objects = self.load_all(canvas_id, &args.object_ids).await?;
        let bounds = bounds_of(&objects);
        let spacing = args.spacing.unwrap_or(self.canvas.layout_spacing);

        // default anchor: where the group already sits
        let anchor = layout::bounding_box(&bounds)
            .map(|b| Point { x: b.x, y: b.y })
            .unwrap_or(Point { x: 0.0, y: 0.0 });
        let origin = Point {
            x: args.x.unwrap_or(anchor.x),
            y: args.y.unwrap_or(anchor.y),
        };

        let points = match args.layout {
            ArrangeLayout::Grid => {
                let columns = args
                    .columns
                    .unwrap_or_else(|| (objects.len() as f64).sqrt().ceil() as usize);
                layout::grid(&bounds, origin, columns, spacing)
            }
            ArrangeLayout::Row => layout::row(&bounds, origin, spacing),
            ArrangeLayout::Column => layout::column(&bounds, origin, spacing),
            ArrangeLayout::Circle => {
                let widest = bounds.iter().map(|b| b.width.max(b.height)).fold(0.0, f64::max);
                let radius = args
                    .radius
                    .unwrap_or((widest + spacing) * objects.len() as f64 / std::f64::consts::TAU)
                    .max(widest);
                let center = Point {
                    x: origin.x + radius,
                    y: origin.y + radius,
                };
                layout::circle(&bounds, center, radius)
            }
        };
        self.place(canvas_id, &objects, &points).await
    }

    async fn select(&self, canvas_id: &str, args: SelectObjectsArgs) -> ToolResult {
        let objects = self.store.list_objects(canvas_id).await?;
        let color = args.color.as_deref().map(str::to_ascii_lowercase);
        let selected: Vec<&str> = objects
            .iter()
            .filter(|o| args.object_ids.is_empty() || args.object_ids.contains(&o.id))
            .filter(|o| {
                args.object_type
                    .as_deref()
                    .is_none_or(|t| o.attrs.object_type.eq_ignore_ascii_case(t))
            })
            .filter(|o| {
                color.as_deref().is_none_or(|c| {
                    o.attrs
                        .properties
                        .get("color")
                        .and_then(Value::as_str)
                        .is_some_and(|oc| oc.eq_ignore_ascii_case(c))
                })
            })
            .map(|o| o.id.as_str())
            .collect();

        if let Some(missing) = args
            .object_ids
            .iter()
            .find(|id| !objects.iter().any(|o| &o.id == *id))
        {
            return Err(ToolFailure::not_found(missing));
        }
        Ok(json!({ "selectedIds": selected }))
    }

    async fn create_connector(&self, canvas_id: &str, args: CreateConnectorArgs) -> ToolResult {
        let from = self.store.get_object(canvas_id, &args.from_id).await?;
        let to = self.store.get_object(canvas_id, &args.to_id).await?;
        let (a, b) = (from.bounds(), to.bounds());
        let (x1, y1, x2, y2) = (a.center_x(), a.center_y(), b.center_x(), b.center_y());

        let attrs = CanvasObjectAttrs::new(
            "connector",
            x1.min(x2),
            y1.min(y2),
            (x2 - x1).abs().max(1.0),
            (y2 - y1).abs().max(1.0),
        )
        .with_property("fromId", from.id.as_str())
        .with_property("toId", to.id.as_str())
        .with_property("points", json!([x1, y1, x2, y2]))
        .with_property(
            "color",
            args.color.as_deref().unwrap_or(&self.canvas.default_text_color),
        );
        let created = self.create(canvas_id, vec![attrs]).await?;
        Ok(created_data(&created))
    }
}

fn require_ids(tool: &str, ids: &[String], min: usize) -> Result<(), ToolFailure> {
    if ids.len() < min {
        return Err(ToolFailure::invalid_arguments(
            tool,
            format!("needs at least {} object id(s)", min),
        ));
    }
    Ok(())
}

fn bounds_of(objects: &[CanvasObject]) -> Vec<crate::types::Bounds> {
    objects.iter().map(CanvasObject::bounds).collect()
}

pub(crate) fn created_data(created: &[CanvasObject]) -> Value {
    let ids: Vec<&str> = created.iter().map(|o| o.id.as_str()).collect();
    json!({ "objectIds": ids, "objects": created })
}
