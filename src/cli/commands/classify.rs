//! Classify Command
//!
//! Show how a command would be routed without calling any provider.

use crate::ai::CommandClassifier;
use crate::cli::ui::Output;
use crate::types::Result;

pub fn run(text: &str, has_selection: bool, format: &str) -> Result<()> {
    let classifier = CommandClassifier::new()?;
    let report = classifier.explain(text, has_selection);

    let out = Output::new();
    if format == "json" {
        return out.json(&report);
    }

    out.field("Classification", report.classification);
    out.field("Reason", format!("{:?}", report.reason));
    Ok(())
}
