//! Command Orchestrator
//!
//! One request lifecycle:
//!
//! ```text
//! canvas check -> classify -> credential check -> route -> validate
//!     -> batch execute -> one telemetry event
//! ```
//!
//! Structural and routing errors end the command before anything executes;
//! per-object errors stay inside their own `ExecutionResult`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

use crate::ai::provider::{
    ProviderHealth, ProviderRouter, RouteAttempt, SharedHealth, TokenUsage,
};
use crate::ai::timeout::{TimeoutConfig, with_timeout};
use crate::ai::{
    CommandClassifier, CommandEvent, MetricsCollector, TelemetrySink, ToolCallValidator,
};
use crate::canvas::{CanvasEventBus, SharedStore};
use crate::config::Config;
use crate::tools::{BatchProcessor, ToolCatalog, ToolDispatcher};
use crate::types::{Classification, Command, ExecutionResult, FlowError, Result};

/// Per-command options supplied by the caller
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Objects selected when the command was issued
    pub selected_ids: Vec<String>,
}

/// Successful command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutcome {
    pub results: Vec<ExecutionResult>,
    pub provider: String,
    pub classification: Classification,
    pub duration_ms: u64,
    pub fell_back: bool,
    pub usage: TokenUsage,
    /// Free text the provider returned alongside its tool calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub attempts: Vec<RouteAttempt>,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}

pub struct Orchestrator {
    classifier: CommandClassifier,
    router: ProviderRouter,
    validator: ToolCallValidator,
    batch: BatchProcessor,
    catalog: ToolCatalog,
    store: SharedStore,
    timeouts: TimeoutConfig,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        router: ProviderRouter,
        store: SharedStore,
        events: CanvasEventBus,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        let dispatcher = ToolDispatcher::new(
            Arc::clone(&store),
            events,
            config.canvas.clone(),
            config.execution.clone(),
        );
        Ok(Self {
            classifier: CommandClassifier::new()?,
            router,
            validator: ToolCallValidator::new(),
            batch: BatchProcessor::new(Arc::new(dispatcher)),
            catalog: ToolCatalog::standard(),
            store,
            timeouts: TimeoutConfig::from_config(config),
            telemetry,
        })
    }

    /// Wire real provider clients and a fresh health registry from config
    pub fn from_config(
        config: &Config,
        store: SharedStore,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self> {
        config.validate()?;
        let health: SharedHealth = ProviderHealth::from_config(config).shared();
        let router = ProviderRouter::from_config(config, health)?;
        Self::new(config, router, store, CanvasEventBus::default(), telemetry)
    }

    /// Convenience for callers that only want the built-in metrics sink
    pub fn with_metrics(
        config: &Config,
        store: SharedStore,
    ) -> Result<(Self, Arc<MetricsCollector>)> {
        let metrics = Arc::new(MetricsCollector::new());
        let orchestrator = Self::from_config(config, store, metrics.clone())?;
        Ok((orchestrator, metrics))
    }

    pub fn classifier(&self) -> &CommandClassifier {
        &self.classifier
    }

    pub fn router(&self) -> &ProviderRouter {
        &self.router
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn events(&self) -> &CanvasEventBus {
        self.batch.dispatcher().events()
    }

    /// Run one natural-language command against a canvas
    #[instrument(skip(self, text, options), fields(canvas = %canvas_id))]
    pub async fn execute_command(
        &self,
        text: &str,
        canvas_id: &str,
        options: CommandOptions,
    ) -> Result<CommandOutcome> {
        let started = Instant::now();
        let command = Command::new(text, canvas_id).with_selection(options.selected_ids);
        let classification = self.classifier.classify(&command);

        let mut answered_by: Option<String> = None;
        let result = self
            .run(&command, classification, started, &mut answered_by)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let event = match &result {
            Ok(outcome) => {
                info!(
                    provider = %outcome.provider,
                    results = outcome.results.len(),
                    failed = outcome.failed(),
                    "Command completed"
                );
                CommandEvent::succeeded(
                    &outcome.provider,
                    classification,
                    outcome.results.len(),
                    duration_ms,
                )
                .with_fallback(outcome.fell_back)
                .with_usage(&outcome.usage)
            }
            Err(err) => {
                warn!(kind = %err.kind(), error = %err, "Command failed");
                // A throttled command never got an answer; attribute it to the provider that refused
                if let FlowError::RateLimited { provider, .. } = err
                    && answered_by.is_none()
                {
                    answered_by = Some(provider.clone());
                }
                CommandEvent::failed(answered_by, classification, duration_ms, err.kind())
            }
        };
        event.trace();
        self.telemetry.record(&event);

        result
    }

    async fn run(
        &self,
        command: &Command,
        classification: Classification,
        started: Instant,
        answered_by: &mut Option<String>,
    ) -> Result<CommandOutcome> {
        let exists = with_timeout(
            self.timeouts.store_lookup,
            async {
                self.store
                    .canvas_exists(&command.canvas_id)
                    .await
                    .map_err(FlowError::from)
            },
            "canvas lookup",
        )
        .await?;
        if !exists {
            return Err(FlowError::CanvasNotFound(command.canvas_id.clone()));
        }

        self.router.ensure_credentials(classification)?;

        let tools = self.catalog.shared_definitions();
        let route = self.router.route(classification, command, &tools).await?;
        *answered_by = Some(route.provider.clone());

        let calls = self.validator.validate_all(&route.tool_calls)?;
        let results = self.batch.execute(&calls, &command.canvas_id).await;

        Ok(CommandOutcome {
            results,
            provider: route.provider,
            classification,
            duration_ms: started.elapsed().as_millis() as u64,
            fell_back: route.fell_back,
            usage: route.usage,
            message: route.text,
            attempts: route.attempts,
        })
    }
}
