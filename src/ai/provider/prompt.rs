//! System prompt assembly shared by every provider client.

use crate::types::{Command, ToolDefinition};

const ROLE: &str = "You are a design assistant operating a collaborative whiteboard canvas. \
Translate the user's request into tool calls. Use only the tools provided. \
Coordinates are in pixels with the origin at the top-left; x grows right, y grows down.";

const RULES: &[&str] = &[
    "Prefer a single create_shape call with `count` over repeating the same call.",
    "Refer to existing objects only by the ids given to you; call get_canvas_state if you need them.",
    "Do not invent object ids for objects you are creating.",
    "If the request is ambiguous, make a reasonable choice rather than asking.",
];

/// Build the system prompt for one command
pub fn build_system_prompt(command: &Command, tools: &[ToolDefinition]) -> String {
    let mut prompt = String::from(ROLE);

    prompt.push_str("\n\n## Context\n");
    prompt.push_str(&format!("- Canvas: {}\n", command.canvas_id));
    if command.selected_ids.is_empty() {
        prompt.push_str("- Selected objects: none\n");
    } else {
        prompt.push_str(&format!(
            "- Selected objects: {}\n",
            command.selected_ids.join(", ")
        ));
    }

    if !tools.is_empty() {
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        prompt.push_str(&format!("- Available tools: {}\n", names.join(", ")));
    }

    prompt.push_str("\n## Rules\n");
    for (i, rule) in RULES.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, rule));
    }

    prompt
}
