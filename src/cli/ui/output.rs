use console::style;
use serde::Serialize;

use crate::types::{ExecutionResult, ToolOutcome};

/// Terminal rendering for command handlers
pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Aligned `label: value` line
    pub fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<14} {}", style(format!("{}:", label)).dim(), value);
    }

    pub fn json<T: Serialize>(&self, value: &T) -> crate::types::Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// One line per tool result, in request order
    pub fn execution_result(&self, index: usize, result: &ExecutionResult) {
        match &result.result {
            ToolOutcome::Success { data } => {
                let detail = data
                    .get("objectIds")
                    .and_then(|ids| ids.as_array())
                    .map(|ids| format!("{} object(s)", ids.len()))
                    .unwrap_or_default();
                println!(
                    "  {:>2}. {} {} {}",
                    index + 1,
                    style("✓").green(),
                    result.tool,
                    style(detail).dim()
                );
            }
            ToolOutcome::Error { kind, message } => {
                println!(
                    "  {:>2}. {} {} {}",
                    index + 1,
                    style("✗").red(),
                    result.tool,
                    style(format!("[{}] {}", kind, message)).red()
                );
            }
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
