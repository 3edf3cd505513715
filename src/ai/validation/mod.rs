//! Tool-Call Validation
//!
//! Two-phase validation of provider output:
//! - Structural (here): `{id, name, input}` present with the right shapes
//! - Semantic (at execution): per-tool typed decoding in `tools::args`
//!
//! Structural failures terminate the whole command before anything executes.
//! Whether `name` is a registered tool is an execution-time concern.

mod tool_call;

pub use tool_call::ToolCallValidator;
