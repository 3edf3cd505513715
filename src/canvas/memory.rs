//! In-memory canvas store
//!
//! One `RwLock` over all canvases. The lock is never held across an await,
//! so the async trait methods complete without suspending.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    CanvasStore, GroupResult, StoreError, StoreResult, validate_batch, validate_patch,
};
use crate::types::{Canvas, CanvasObject, CanvasObjectAttrs, ObjectPatch};

struct CanvasRecord {
    canvas: Canvas,
    /// Insertion order
    objects: Vec<CanvasObject>,
    next_z: i64,
}

impl CanvasRecord {
    fn find_mut(&mut self, object_id: &str) -> StoreResult<&mut CanvasObject> {
        self.objects
            .iter_mut()
            .find(|o| o.id == object_id)
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryCanvasStore {
    canvases: RwLock<HashMap<String, CanvasRecord>>,
}

impl MemoryCanvasStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a canvas under a caller-chosen id
    pub fn insert_canvas(&self, id: &str, name: &str) -> Canvas {
        let canvas = Canvas {
            id: id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        self.write().insert(
            id.to_string(),
            CanvasRecord {
                canvas: canvas.clone(),
                objects: Vec::new(),
                next_z: 0,
            },
        );
        canvas
    }

    /// Total committed objects on a canvas (0 for unknown canvases)
    pub fn object_count(&self, canvas_id: &str) -> usize {
        self.read()
            .get(canvas_id)
            .map(|r| r.objects.len())
            .unwrap_or(0)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, CanvasRecord>> {
        self.canvases.read().unwrap_or_else(|poisoned| {
            tracing::error!("Canvas store RwLock poisoned on read, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, CanvasRecord>> {
        self.canvases.write().unwrap_or_else(|poisoned| {
            tracing::error!("Canvas store RwLock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

fn missing_canvas(canvas_id: &str) -> StoreError {
    StoreError::CanvasNotFound(canvas_id.to_string())
}

#[async_trait]
impl CanvasStore for MemoryCanvasStore {
    async fn canvas_exists(&self, canvas_id: &str) -> StoreResult<bool> {
        Ok(self.read().contains_key(canvas_id))
    }

    async fn create_canvas(&self, name: &str) -> StoreResult<Canvas> {
        let id = uuid::Uuid::new_v4().to_string();
        Ok(self.insert_canvas(&id, name))
    }

    async fn get_canvas(&self, canvas_id: &str) -> StoreResult<Canvas> {
        self.read()
            .get(canvas_id)
            .map(|r| r.canvas.clone())
            .ok_or_else(|| missing_canvas(canvas_id))
    }

    async fn create_objects_batch(
        &self,
        canvas_id: &str,
        attrs: Vec<CanvasObjectAttrs>,
    ) -> StoreResult<Vec<CanvasObject>> {
        validate_batch(&attrs)?;

        let mut canvases = self.write();
        let record = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;

        let mut created = Vec::with_capacity(attrs.len());
        for mut entry in attrs {
            if entry.z_index.is_none() {
                entry.z_index = Some(record.next_z);
                record.next_z += 1;
            }
            created.push(CanvasObject::from_attrs(canvas_id, entry));
        }
        record.objects.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<CanvasObject> {
        let canvases = self.read();
        let record = canvases
            .get(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;
        record
            .objects
            .iter()
            .find(|o| o.id == object_id)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(object_id.to_string()))
    }

    async fn list_objects(&self, canvas_id: &str) -> StoreResult<Vec<CanvasObject>> {
        let canvases = self.read();
        let record = canvases
            .get(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;
        let mut objects = record.objects.clone();
        objects.sort_by_key(|o| (o.attrs.z_index.unwrap_or(0), o.created_at));
        Ok(objects)
    }

    async fn update_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        patch: &ObjectPatch,
    ) -> StoreResult<CanvasObject> {
        validate_patch(object_id, patch)?;
        let mut canvases = self.write();
        let record = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;
        let object = record.find_mut(object_id)?;
        object.apply(patch);
        Ok(object.clone())
    }

    async fn delete_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<()> {
        let mut canvases = self.write();
        let record = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;
        let before = record.objects.len();
        record.objects.retain(|o| o.id != object_id);
        if record.objects.len() == before {
            return Err(StoreError::ObjectNotFound(object_id.to_string()));
        }
        Ok(())
    }

    async fn group_objects(
        &self,
        canvas_id: &str,
        object_ids: &[String],
        group_id: Option<String>,
    ) -> StoreResult<GroupResult> {
        let mut canvases = self.write();
        let record = canvases
            .get_mut(canvas_id)
            .ok_or_else(|| missing_canvas(canvas_id))?;

        if let Some(missing) = object_ids
            .iter()
            .find(|id| !record.objects.iter().any(|o| &o.id == *id))
        {
            return Err(StoreError::ObjectNotFound(missing.clone()));
        }

        let group_id = group_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let patch = ObjectPatch {
            group_id: Some(group_id.clone()),
            ..Default::default()
        };
        let mut objects = Vec::with_capacity(object_ids.len());
        for id in object_ids {
            let object = record.find_mut(id)?;
            object.apply(&patch);
            objects.push(object.clone());
        }
        Ok(GroupResult { group_id, objects })
    }
}
