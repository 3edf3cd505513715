//! Exec Command
//!
//! Run one natural-language command against a canvas.

use serde_json::json;
use std::sync::Arc;

use crate::ai::MetricsCollector;
use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, parse_selection};
use crate::orchestrator::{CommandOptions, Orchestrator};
use crate::types::Result;

pub struct ExecOptions<'a> {
    pub text: &'a str,
    pub canvas_id: &'a str,
    pub select: Option<&'a str>,
    pub format: &'a str,
}

pub async fn run(options: ExecOptions<'_>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let metrics = Arc::new(MetricsCollector::new());
    let orchestrator = Orchestrator::from_config(&ctx.config, ctx.store.clone(), metrics.clone())?;

    let command_options = CommandOptions {
        selected_ids: parse_selection(options.select),
    };
    let out = Output::new();

    let outcome = match orchestrator
        .execute_command(options.text, options.canvas_id, command_options)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            // Text mode leaves rendering to the caller, which goes through the kind
            if options.format == "json" {
                let kind = err.kind();
                out.json(&json!({
                    "error": kind,
                    "message": kind.user_message(),
                }))?;
            }
            return Err(err);
        }
    };

    if options.format == "json" {
        return out.json(&outcome);
    }

    let via = if outcome.fell_back {
        format!("{} (fallback)", outcome.provider)
    } else {
        outcome.provider.clone()
    };
    out.field("Classification", outcome.classification);
    out.field("Provider", via);
    out.field("Duration", format!("{}ms", outcome.duration_ms));

    if outcome.results.is_empty() {
        out.warning("No actions were taken");
    } else {
        println!();
        for (index, result) in outcome.results.iter().enumerate() {
            out.execution_result(index, result);
        }
    }

    if let Some(message) = &outcome.message {
        println!();
        out.info(message);
    }

    println!();
    if outcome.failed() == 0 {
        out.success(&format!("{} action(s) applied", outcome.succeeded()));
    } else {
        out.warning(&format!(
            "{} applied, {} failed",
            outcome.succeeded(),
            outcome.failed()
        ));
    }

    tracing::debug!("{}", metrics.snapshot().display());
    Ok(())
}
