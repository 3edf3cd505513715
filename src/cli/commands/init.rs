//! Init Command
//!
//! Initialize canvasflow in the current directory.

use crate::cli::ui::Output;
use crate::cli::util::{is_initialized, open_store};
use crate::config::ConfigLoader;
use crate::types::{FlowError, Result};

pub fn run(force: bool) -> Result<()> {
    if is_initialized() && !force {
        return Err(FlowError::Config(
            "Already initialized. Use --force to reinitialize.".to_string(),
        ));
    }

    let project_dir = ConfigLoader::init_project()?;

    // Global config is a convenience; never overwrite it from here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let config = ConfigLoader::load()?;
    open_store(&config)?;

    let out = Output::new();
    out.success(&format!("Initialized canvasflow in {}/", project_dir.display()));
    out.field("Database", config.storage.database_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Export OPENAI_API_KEY and/or ANTHROPIC_API_KEY");
    println!("  2. canvasflow canvas create \"My board\"");
    println!("  3. canvasflow exec \"create 3 blue circles\" --canvas <id>");

    Ok(())
}
