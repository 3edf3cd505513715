//! Tool Execution
//!
//! - `catalog`: registered tools and their schemas
//! - `args`: per-tool typed decoding of `input`
//! - `creation`: creation calls to (expanded) attribute sets
//! - `dispatch`: one individual call against the canvas store
//! - `batch`: the whole command, creation group batched atomically

pub mod args;
pub mod batch;
pub mod catalog;
pub mod creation;
pub mod dispatch;

pub use batch::{BatchProcessor, created_objects};
pub use catalog::{ToolCatalog, ToolKind};
pub use dispatch::ToolDispatcher;
