//! Command and tool-call data model
//!
//! Everything here is request-scoped: created when a command arrives and
//! discarded once its results are returned.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::ErrorKind;

/// A natural-language design command addressed to one canvas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub text: String,
    pub canvas_id: String,
    /// Objects the user had selected when issuing the command
    #[serde(default)]
    pub selected_ids: Vec<String>,
}

impl Command {
    pub fn new(text: impl Into<String>, canvas_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            canvas_id: canvas_id.into(),
            selected_ids: Vec::new(),
        }
    }

    pub fn with_selection(mut self, ids: Vec<String>) -> Self {
        self.selected_ids = ids;
        self
    }

    pub fn has_selection(&self) -> bool {
        !self.selected_ids.is_empty()
    }
}

/// Routing class assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    FastPath,
    ComplexPath,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::ComplexPath => "complex_path",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structurally validated tool call: `{id, name, input}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Map<String, Value>,
}

/// Tool schema entry sent to every provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the `input` object
    pub input_schema: Value,
}

/// Per-call outcome, one per tool call, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub tool: String,
    pub input: Map<String, Value>,
    pub result: ToolOutcome,
}

impl ExecutionResult {
    pub fn new(call: &ToolCall, result: ToolOutcome) -> Self {
        Self {
            tool: call.name.clone(),
            input: call.input.clone(),
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ToolOutcome {
    Success { data: Value },
    Error { kind: ErrorKind, message: String },
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Error { kind, .. } => Some(*kind),
        }
    }
}

impl From<ToolFailure> for ToolOutcome {
    fn from(failure: ToolFailure) -> Self {
        Self::Error {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

/// Failure of a single tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(ErrorKind::UnknownTool, format!("Unknown tool: {}", name))
    }

    pub fn not_found(id: &str) -> Self {
        Self::new(ErrorKind::ObjectNotFound, format!("Object not found: {}", id))
    }

    pub fn invalid_arguments(tool: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidArguments,
            format!("Invalid arguments for {}: {}", tool, reason),
        )
    }
}

impl std::fmt::Display for ToolFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolFailure {}
