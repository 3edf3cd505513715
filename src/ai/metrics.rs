//! Command Telemetry
//!
//! One `CommandEvent` per command, emitted as a `tracing` event on the
//! `canvasflow::telemetry` target and recorded into a `TelemetrySink`.
//! `MetricsCollector` is the built-in sink; thread-safe for concurrent
//! commands.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use crate::ai::provider::TokenUsage;
use crate::constants::telemetry as telemetry_constants;
use crate::types::{Classification, ErrorKind};

pub const TELEMETRY_TARGET: &str = "canvasflow::telemetry";

// =============================================================================
// Command Event
// =============================================================================

/// Observability record for one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEvent {
    /// Provider that answered; absent when the command failed before one did
    pub provider: Option<String>,
    pub classification: Classification,
    pub tool_count: usize,
    pub duration_ms: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub fell_back: bool,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl CommandEvent {
    pub fn succeeded(
        provider: impl Into<String>,
        classification: Classification,
        tool_count: usize,
        duration_ms: u64,
    ) -> Self {
        Self {
            provider: Some(provider.into()),
            classification,
            tool_count,
            duration_ms,
            success: true,
            error_kind: None,
            fell_back: false,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn failed(
        provider: Option<String>,
        classification: Classification,
        duration_ms: u64,
        error_kind: ErrorKind,
    ) -> Self {
        Self {
            provider,
            classification,
            tool_count: 0,
            duration_ms,
            success: false,
            error_kind: Some(error_kind),
            fell_back: false,
            input_tokens: 0,
            output_tokens: 0,
        }
    }

    pub fn with_fallback(mut self, fell_back: bool) -> Self {
        self.fell_back = fell_back;
        self
    }

    pub fn with_usage(mut self, usage: &TokenUsage) -> Self {
        self.input_tokens = usage.input_tokens;
        self.output_tokens = usage.output_tokens;
        self
    }

    /// Write the event to the telemetry log target
    pub fn trace(&self) {
        tracing::info!(
            target: TELEMETRY_TARGET,
            provider = self.provider.as_deref().unwrap_or("-"),
            classification = %self.classification,
            tool_count = self.tool_count,
            duration_ms = self.duration_ms,
            success = self.success,
            error_kind = self.error_kind.map(|k| k.as_str()).unwrap_or("-"),
            fell_back = self.fell_back,
            "command"
        );
    }
}

/// Destination for command events
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: &CommandEvent);
}

// =============================================================================
// Metrics Collector
// =============================================================================

/// In-process aggregate of command events.
///
/// Atomics for counters, locks only for the per-provider map and the
/// recent-event ring.
pub struct MetricsCollector {
    start_time: Instant,
    commands: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    fallbacks: AtomicU64,
    tool_calls: AtomicU64,
    total_latency_ms: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    per_provider: RwLock<HashMap<String, u64>>,
    recent: Mutex<VecDeque<CommandEvent>>,
    capacity: usize,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub uptime_ms: u64,
    pub commands: u64,
    pub successes: u64,
    pub failures: u64,
    pub fallbacks: u64,
    pub tool_calls: u64,
    pub avg_latency_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub per_provider: Vec<(String, u64)>,
    pub recent: Vec<CommandEvent>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::with_capacity(telemetry_constants::RECENT_EVENTS)
    }

    /// Collector keeping at most `capacity` recent events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            start_time: Instant::now(),
            commands: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            per_provider: RwLock::new(HashMap::new()),
            recent: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn snapshot(&self) -> MetricsSummary {
        let commands = self.commands.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        let mut per_provider: Vec<(String, u64)> = self
            .per_provider
            .read()
            .unwrap_or_else(|poisoned| {
                tracing::error!("Metrics per_provider RwLock poisoned on read, recovering");
                poisoned.into_inner()
            })
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .collect();
        per_provider.sort();

        let recent = self
            .recent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect();

        MetricsSummary {
            uptime_ms: self.start_time.elapsed().as_millis() as u64,
            commands,
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            avg_latency_ms: if commands > 0 {
                total_latency as f64 / commands as f64
            } else {
                0.0
            },
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            per_provider,
            recent,
        }
    }
}

impl TelemetrySink for MetricsCollector {
    fn record(&self, event: &CommandEvent) {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if event.success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        if event.fell_back {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
        }
        self.tool_calls
            .fetch_add(event.tool_count as u64, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(event.duration_ms, Ordering::Relaxed);
        self.input_tokens
            .fetch_add(event.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(event.output_tokens as u64, Ordering::Relaxed);

        if let Some(provider) = &event.provider {
            let mut map = self.per_provider.write().unwrap_or_else(|poisoned| {
                tracing::error!("Metrics per_provider RwLock poisoned, recovering");
                poisoned.into_inner()
            });
            *map.entry(provider.clone()).or_insert(0) += 1;
        }

        if self.capacity > 0 {
            let mut recent = self
                .recent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if recent.len() == self.capacity {
                recent.pop_front();
            }
            recent.push_back(event.clone());
        }
    }
}

impl MetricsSummary {
    /// Format summary for display
    pub fn display(&self) -> String {
        format!(
            "Commands: {} (ok: {}, failed: {}, fallback: {})\n\
             Tool calls: {}\n\
             Avg latency: {:.0}ms\n\
             Tokens: {} in / {} out",
            self.commands,
            self.successes,
            self.failures,
            self.fallbacks,
            self.tool_calls,
            self.avg_latency_ms,
            self.input_tokens,
            self.output_tokens
        )
    }
}

/// Shared metrics collector
pub type SharedMetrics = Arc<MetricsCollector>;

pub fn create_shared_metrics() -> SharedMetrics {
    Arc::new(MetricsCollector::new())
}
