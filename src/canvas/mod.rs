//! Canvas Store Collaborator
//!
//! The persistence boundary this layer executes tool calls against:
//! an atomic multi-insert for creation batches plus per-object mutations that
//! fail per object. Two implementations ship: an in-memory store and a
//! pooled SQLite store.

pub mod events;
pub mod layout;
mod memory;
mod sqlite;

pub use events::{CanvasEvent, CanvasEventBus};
pub use memory::MemoryCanvasStore;
pub use sqlite::{Database, PoolConfig, SqliteCanvasStore};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

use crate::types::{
    Canvas, CanvasObject, CanvasObjectAttrs, ErrorKind, KNOWN_OBJECT_TYPES, ObjectPatch, ToolFailure,
};

// =============================================================================
// Store Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Canvas not found: {0}")]
    CanvasNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    /// One attribute set in a batch was rejected; nothing was committed
    #[error("Invalid attributes at index {index}: {reason}")]
    InvalidAttributes { index: usize, reason: String },

    #[error("Invalid update for {id}: {reason}")]
    InvalidPatch { id: String, reason: String },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CanvasNotFound(_) => ErrorKind::CanvasNotFound,
            Self::ObjectNotFound(_) => ErrorKind::ObjectNotFound,
            Self::InvalidAttributes { .. } => ErrorKind::BatchInsertFailed,
            Self::InvalidPatch { .. } => ErrorKind::InvalidArguments,
            Self::Backend(_) => ErrorKind::Storage,
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Backend(format!("Connection pool error: {}", err))
    }
}

impl From<StoreError> for ToolFailure {
    fn from(err: StoreError) -> Self {
        ToolFailure::new(err.kind(), err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

// =============================================================================
// Store Trait
// =============================================================================

/// Result of grouping objects
#[derive(Debug, Clone)]
pub struct GroupResult {
    pub group_id: String,
    pub objects: Vec<CanvasObject>,
}

#[async_trait]
pub trait CanvasStore: Send + Sync {
    async fn canvas_exists(&self, canvas_id: &str) -> StoreResult<bool>;

    async fn create_canvas(&self, name: &str) -> StoreResult<Canvas>;

    async fn get_canvas(&self, canvas_id: &str) -> StoreResult<Canvas>;

    /// Atomic multi-insert: every attribute set commits, or none does
    async fn create_objects_batch(
        &self,
        canvas_id: &str,
        attrs: Vec<CanvasObjectAttrs>,
    ) -> StoreResult<Vec<CanvasObject>>;

    async fn get_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<CanvasObject>;

    /// Objects in paint order (z-index, then creation time)
    async fn list_objects(&self, canvas_id: &str) -> StoreResult<Vec<CanvasObject>>;

    async fn update_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        patch: &ObjectPatch,
    ) -> StoreResult<CanvasObject>;

    async fn delete_object(&self, canvas_id: &str, object_id: &str) -> StoreResult<()>;

    /// Assign one group id to every listed object; all ids must exist
    async fn group_objects(
        &self,
        canvas_id: &str,
        object_ids: &[String],
        group_id: Option<String>,
    ) -> StoreResult<GroupResult>;

    async fn move_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        x: f64,
        y: f64,
    ) -> StoreResult<CanvasObject> {
        self.update_object(canvas_id, object_id, &ObjectPatch::position(x, y))
            .await
    }

    async fn resize_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        width: f64,
        height: f64,
    ) -> StoreResult<CanvasObject> {
        self.update_object(canvas_id, object_id, &ObjectPatch::size(width, height))
            .await
    }

    async fn rotate_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        degrees: f64,
    ) -> StoreResult<CanvasObject> {
        self.update_object(canvas_id, object_id, &ObjectPatch::rotation(degrees))
            .await
    }

    async fn restyle_object(
        &self,
        canvas_id: &str,
        object_id: &str,
        properties: Map<String, Value>,
    ) -> StoreResult<CanvasObject> {
        self.update_object(canvas_id, object_id, &ObjectPatch::properties(properties))
            .await
    }
}

pub type SharedStore = Arc<dyn CanvasStore>;

// =============================================================================
// Attribute Validation
// =============================================================================

/// Check one attribute set: known type, finite position, positive finite size
pub fn validate_attrs(attrs: &CanvasObjectAttrs) -> std::result::Result<(), String> {
    if !KNOWN_OBJECT_TYPES.contains(&attrs.object_type.as_str()) {
        return Err(format!("unknown object type '{}'", attrs.object_type));
    }
    if !attrs.x.is_finite() || !attrs.y.is_finite() {
        return Err("position must be finite".to_string());
    }
    if !attrs.rotation.is_finite() {
        return Err("rotation must be finite".to_string());
    }
    check_size(attrs.width, attrs.height)
}

/// Validate a whole batch, reporting the first offending index
pub fn validate_batch(attrs: &[CanvasObjectAttrs]) -> StoreResult<()> {
    for (index, entry) in attrs.iter().enumerate() {
        validate_attrs(entry).map_err(|reason| StoreError::InvalidAttributes { index, reason })?;
    }
    Ok(())
}

pub fn validate_patch(object_id: &str, patch: &ObjectPatch) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidPatch {
        id: object_id.to_string(),
        reason: reason.to_string(),
    };
    if [patch.x, patch.y, patch.rotation]
        .iter()
        .flatten()
        .any(|v| !v.is_finite())
    {
        return Err(invalid("values must be finite"));
    }
    if [patch.width, patch.height]
        .iter()
        .flatten()
        .any(|v| !v.is_finite() || *v <= 0.0)
    {
        return Err(invalid("size must be positive"));
    }
    Ok(())
}

fn check_size(width: f64, height: f64) -> std::result::Result<(), String> {
    if !(width.is_finite() && width > 0.0 && height.is_finite() && height > 0.0) {
        return Err(format!("size must be positive, got {}x{}", width, height));
    }
    Ok(())
}
