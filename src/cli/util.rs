//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::canvas::{PoolConfig, SqliteCanvasStore};
use crate::config::{Config, ConfigLoader};
use crate::types::{FlowError, Result};

/// Command execution context
///
/// Created via `CommandContext::load()` for commands that touch the canvas
/// database.
#[derive(Clone)]
pub struct CommandContext {
    /// Project data directory (.canvasflow)
    pub project_dir: PathBuf,
    /// Loaded configuration
    pub config: Config,
    /// Canvas store backed by `storage.database_path`
    pub store: Arc<SqliteCanvasStore>,
}

impl CommandContext {
    /// Validates initialization, loads config, and opens the canvas database.
    pub fn load() -> Result<Self> {
        let project_dir = require_initialized()?;
        let config = ConfigLoader::load()?;
        let store = open_store(&config)?;

        Ok(Self {
            project_dir,
            config,
            store: Arc::new(store),
        })
    }

    pub fn database_path(&self) -> &Path {
        &self.config.storage.database_path
    }
}

/// Open (and migrate) the configured canvas database
pub fn open_store(config: &Config) -> Result<SqliteCanvasStore> {
    let store = SqliteCanvasStore::open(
        &config.storage.database_path,
        PoolConfig::from_storage(&config.storage),
    )?;
    Ok(store)
}

/// Returns the .canvasflow directory path if initialized
pub fn require_initialized() -> Result<PathBuf> {
    let project_dir = ConfigLoader::project_dir();

    if !project_dir.exists() {
        return Err(FlowError::Config(
            "Not initialized. Run 'canvasflow init' first.".to_string(),
        ));
    }

    Ok(project_dir)
}

pub fn is_initialized() -> bool {
    ConfigLoader::project_dir().exists()
}

/// Split a comma-separated `--select` value, dropping blanks
pub fn parse_selection(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}
