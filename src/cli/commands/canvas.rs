//! Canvas Command
//!
//! Create canvases and inspect their contents.

use serde_json::json;

use crate::canvas::CanvasStore;
use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::Result;

pub async fn create(name: &str, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let canvas = ctx.store.create_canvas(name).await?;

    let out = Output::new();
    if format == "json" {
        return out.json(&canvas);
    }

    out.success(&format!("Created canvas '{}'", canvas.name));
    out.field("Id", &canvas.id);
    Ok(())
}

pub async fn show(canvas_id: &str, format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let canvas = ctx.store.get_canvas(canvas_id).await?;
    let objects = ctx.store.list_objects(canvas_id).await?;

    let out = Output::new();
    if format == "json" {
        return out.json(&json!({
            "canvas": canvas,
            "objects": objects,
        }));
    }

    out.section(&format!("Canvas: {}", canvas.name));
    out.field("Id", &canvas.id);
    out.field("Created", canvas.created_at.to_rfc3339());
    out.field("Objects", objects.len());

    if !objects.is_empty() {
        println!();
        for object in &objects {
            let attrs = &object.attrs;
            let group = attrs
                .group_id
                .as_deref()
                .map(|g| format!(" group={}", g))
                .unwrap_or_default();
            println!(
                "  {} {:<12} ({:.0}, {:.0}) {:.0}x{:.0}{}",
                object.id, attrs.object_type, attrs.x, attrs.y, attrs.width, attrs.height, group
            );
        }
    }

    Ok(())
}
