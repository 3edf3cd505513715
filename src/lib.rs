//! canvasflow - Natural-Language Command Orchestration for Design Canvases
//!
//! Turns a free-text command ("create 5 red rectangles", "build a login form")
//! into validated tool calls executed against a shared canvas, routing each
//! request across LLM providers with circuit breaking, rate limiting and
//! fallback.
//!
//! ## Quick Start
//!
//! ```ignore
//! use canvasflow::{CommandOptions, ConfigLoader, Orchestrator, SqliteCanvasStore};
//!
//! let config = ConfigLoader::load()?;
//! let store = Arc::new(SqliteCanvasStore::open(&config.storage.database_path, Default::default())?);
//! let (orchestrator, metrics) = Orchestrator::with_metrics(&config, store)?;
//! let outcome = orchestrator
//!     .execute_command("create 3 blue circles", &canvas_id, CommandOptions::default())
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: classifier, provider clients and router, breaker, rate limiting, telemetry
//! - [`tools`]: tool catalogue, argument decoding, batch execution
//! - [`canvas`]: canvas store trait, in-memory and SQLite stores, layout, events
//! - [`orchestrator`]: the per-command lifecycle
//! - [`config`]: layered configuration

pub mod ai;
pub mod canvas;
pub mod cli;
pub mod config;
pub mod constants;
pub mod orchestrator;
pub mod tools;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};
pub use orchestrator::{CommandOptions, CommandOutcome, Orchestrator};
pub use types::{
    Classification, Command, ErrorKind, ExecutionResult, FlowError, Result, ToolCall,
    ToolOutcome,
};

// =============================================================================
// Canvas Re-exports
// =============================================================================

pub use canvas::{
    CanvasEvent, CanvasEventBus, CanvasStore, MemoryCanvasStore, SharedStore, SqliteCanvasStore,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    CircuitBreaker, CommandClassifier, MetricsCollector, ProviderClient, ProviderHealth,
    ProviderRouter, RateLimiter, SharedMetrics, TelemetrySink, TimeoutConfig, ToolCallValidator,
    with_timeout,
};

pub use tools::{BatchProcessor, ToolCatalog};
