pub mod canvas;
pub mod error;
pub mod tool;

pub use canvas::{
    Bounds, Canvas, CanvasObject, CanvasObjectAttrs, KNOWN_OBJECT_TYPES, ObjectPatch,
};
pub use error::{
    ErrorClassifier, ErrorKind, FlowError, ProviderError, ProviderErrorKind, Result,
    ToolCallDefect, ToolCallError,
};
pub use tool::{
    Classification, Command, ExecutionResult, ToolCall, ToolDefinition, ToolFailure, ToolOutcome,
};
