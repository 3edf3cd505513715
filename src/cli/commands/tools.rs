//! Tools Command
//!
//! List the tool catalogue offered to providers.

use crate::cli::ui::Output;
use crate::tools::{ToolCatalog, ToolKind};
use crate::types::Result;

pub fn run(format: &str) -> Result<()> {
    let catalog = ToolCatalog::standard();
    let out = Output::new();

    if format == "json" {
        return out.json(&catalog.definitions());
    }

    out.section("Creation tools (batched)");
    for kind in ToolKind::ALL.iter().filter(|k| k.is_creation()) {
        print_tool(&catalog, *kind);
    }

    out.section("Individual tools");
    for kind in ToolKind::ALL.iter().filter(|k| !k.is_creation()) {
        print_tool(&catalog, *kind);
    }

    Ok(())
}

fn print_tool(catalog: &ToolCatalog, kind: ToolKind) {
    if let Some(definition) = catalog
        .definitions()
        .iter()
        .find(|d| d.name == kind.as_str())
    {
        println!("  {:<20} {}", definition.name, definition.description);
    }
}
