//! Command Classifier
//!
//! Static, pattern-based triage of incoming commands. Pure and sub-millisecond:
//! no I/O, no allocation beyond normalizing the input.
//!
//! | Step | Check | Result |
//! |------|-------|--------|
//! | 1 | Single parameterized action template (create/move/delete) | `fast_path` |
//! | 2 | Multiple operations (sequencing, several verbs, or a list of objects) | `complex_path` |
//! | 3 | Contextual reference without a selection | `complex_path` |
//! | 4 | Named multi-part component | `complex_path` |
//! | 5 | Layout verb | `complex_path` |
//! | - | Otherwise | `fast_path` |

use regex::Regex;
use serde::Serialize;

use crate::types::{Classification, Command, FlowError, Result};

const COLORS: &str = r"red|orange|yellow|green|blue|purple|violet|pink|black|white|gray|grey|brown|cyan|teal|magenta|navy|#[0-9a-f]{3}|#[0-9a-f]{6}";

const SHAPES: &str = r"rectangle|rect|square|circle|ellipse|oval|triangle|diamond|star|line|arrow|box|shape|text(?:\s+box)?|label|sticky(?:\s+note)?|note|frame";

const NUMBER: &str = r"-?\d+(?:\.\d+)?";

/// Object reference: a shape noun (optionally colored, optionally with an id),
/// or a bare id. Ids must contain a digit, which keeps pronouns out.
fn reference_pattern() -> String {
    format!(
        r"(?:(?:the\s+)?(?:(?:{COLORS})\s+)?(?:{SHAPES}|object|element|item)(?:\s+#?[a-z0-9_-]*\d[a-z0-9_-]*)?|#?[a-z0-9_-]*\d[a-z0-9_-]*)"
    )
}

/// Two object phrases joined by "and" or a comma: "a red square and a blue
/// circle", "3 circles and 2 squares", "a circle, a square".
fn object_list_pattern() -> String {
    let phrase = format!(
        r"(?:(?:an?|one|the|\d{{1,3}})\s+)?(?:(?:small|big|large|tiny|wide|tall)\s+)?(?:(?:{COLORS})\s+)?(?:{SHAPES})(?:e?s)?"
    );
    format!(r"\b(?:{SHAPES})(?:e?s)?\s*(?:,\s*(?:and\s+)?|\s+and\s+){phrase}\b")
}

fn coordinates_pattern() -> String {
    format!(r"\(?\s*(?:x\s*=\s*)?{NUMBER}\s*,\s*(?:y\s*=\s*)?{NUMBER}\s*\)?")
}

/// Why a command landed where it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum ClassificationReason {
    /// Matched a single-action template
    Template(&'static str),
    MultipleOperations,
    ContextReference(String),
    Component(String),
    LayoutVerb(String),
    /// Nothing complex detected
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub classification: Classification,
    pub reason: ClassificationReason,
}

struct Template {
    name: &'static str,
    regex: Regex,
}

/// Pattern-based command classifier
///
/// Compiled once and shared; classification never fails.
pub struct CommandClassifier {
    templates: Vec<Template>,
    sequencing: Regex,
    object_list: Regex,
    action_verb: Regex,
    context_reference: Regex,
    component: Regex,
    layout_verb: Regex,
}

impl CommandClassifier {
    pub fn new() -> Result<Self> {
        let reference = reference_pattern();
        let coordinates = coordinates_pattern();
        let polite = r"^(?:please\s+)?(?:can you\s+|could you\s+)?";
        let tail = r"\s*[.!]?\s*$";

        let create = format!(
            r#"{polite}(?:create|add|make|draw|insert|place)\s+(?:an?\s+|one\s+|\d{{1,3}}\s+)?(?:(?:small|big|large|tiny|wide|tall)\s+)?(?:(?:{COLORS})\s+)?(?:{SHAPES})(?:e?s)?(?:\s+(?:in\s+)?(?:{COLORS}))?(?:\s+(?:at|to)\s+{coordinates})?(?:\s+(?:of\s+|with\s+)?(?:size\s+)?\d+\s*(?:x|by)\s*\d+)?(?:\s+(?:saying|that says|with(?: the)? text|labell?ed)\s+(?:"[^"]*"|'[^']*'))?{tail}"#
        );
        let move_to = format!(r"{polite}(?:move|drag|put)\s+{reference}\s+to\s+{coordinates}{tail}");
        let delete = format!(r"{polite}(?:delete|remove|erase)\s+{reference}{tail}");

        let compile = |pattern: &str| {
            Regex::new(pattern)
                .map_err(|e| FlowError::Internal(format!("Invalid classifier pattern: {}", e)))
        };

        Ok(Self {
            templates: vec![
                Template {
                    name: "create",
                    regex: compile(&create)?,
                },
                Template {
                    name: "move",
                    regex: compile(&move_to)?,
                },
                Template {
                    name: "delete",
                    regex: compile(&delete)?,
                },
            ],
            sequencing: compile(r"\b(?:and then|then|after that|afterwards|also|followed by)\b|;")?,
            object_list: compile(&object_list_pattern())?,
            action_verb: compile(
                r"\b(?:create|add|make|draw|insert|place|move|drag|delete|remove|erase|resize|rotate|recolou?r|color|colour|change|update|rename|group|connect|link|align|arrange|distribute|duplicate|copy)\b",
            )?,
            context_reference: compile(r"\b(?:this|these|that|those|it|them|selected|selection)\b")?,
            component: compile(
                r"\b(?:login form|log-in form|sign ?up form|registration form|contact form|checkout form|nav ?bar|navigation bar|side ?bar|header|footer|dashboard|kanban(?: board)?|flow ?chart|swot(?: analysis)?|wireframe|mind ?map|org(?:anization)? chart|timeline|user journey|journey map|retro(?:spective)?|pros and cons|matrix|table|form|card layout|landing page)\b",
            )?,
            layout_verb: compile(
                r"\b(?:arrange|align|distribute|organi[sz]e|lay out|layout|grid|stack|space out|spread out|tidy)\b",
            )?,
        })
    }

    /// Classify a command
    pub fn classify(&self, command: &Command) -> Classification {
        self.explain(&command.text, command.has_selection())
            .classification
    }

    /// Classify bare text with no selection
    pub fn classify_text(&self, text: &str) -> Classification {
        self.explain(text, false).classification
    }

    /// Classify and report which rule decided
    pub fn explain(&self, text: &str, has_selection: bool) -> ClassificationReport {
        let normalized = normalize(text);
        let reason = self.reason(&normalized, has_selection);
        let classification = match reason {
            ClassificationReason::Template(_) | ClassificationReason::Default => {
                Classification::FastPath
            }
            _ => Classification::ComplexPath,
        };
        ClassificationReport {
            classification,
            reason,
        }
    }

    fn reason(&self, text: &str, has_selection: bool) -> ClassificationReason {
        if let Some(template) = self.templates.iter().find(|t| t.regex.is_match(text)) {
            return ClassificationReason::Template(template.name);
        }

        if self.sequencing.is_match(text)
            || self.object_list.is_match(text)
            || self.action_verb.find_iter(text).count() >= 2
        {
            return ClassificationReason::MultipleOperations;
        }

        if !has_selection && let Some(m) = self.context_reference.find(text) {
            return ClassificationReason::ContextReference(m.as_str().to_string());
        }

        if let Some(m) = self.component.find(text) {
            return ClassificationReason::Component(m.as_str().to_string());
        }

        if let Some(m) = self.layout_verb.find(text) {
            return ClassificationReason::LayoutVerb(m.as_str().to_string());
        }

        ClassificationReason::Default
    }
}

/// Lowercase and collapse whitespace
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
