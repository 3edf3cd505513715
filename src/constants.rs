//! Global Constants
//!
//! Centralized defaults for configuration and tuning.
//! Every value here is only a default: the live value comes from `Config`.

/// Circuit breaker constants
pub mod circuit_breaker {
    /// Number of consecutive failures before opening circuit
    pub const FAILURE_THRESHOLD: u32 = 5;

    /// Duration to wait before allowing a recovery probe (seconds)
    pub const COOL_DOWN_SECS: u64 = 30;
}

/// Per-provider admission window constants
pub mod rate_limit {
    /// Fixed window length (seconds)
    pub const WINDOW_SECS: u64 = 60;

    /// Requests admitted per provider per window
    pub const MAX_REQUESTS: u32 = 60;
}

/// HTTP/Network constants
pub mod network {
    /// Default provider call timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;

    /// Timeout for canvas store round trips made before routing (seconds)
    pub const STORE_TIMEOUT_SECS: u64 = 10;
}

/// Tool execution constants
pub mod execution {
    /// Maximum tool-call jobs in flight per command
    pub const MAX_CONCURRENCY: usize = 10;

    /// Largest repetition count a single creation call may request
    pub const MAX_REPEAT: u32 = 100;

    /// Step between repeated objects, as a multiple of the object's own size
    pub const REPEAT_SPACING: f64 = 1.5;
}

/// Canvas object defaults
pub mod canvas {
    pub const DEFAULT_WIDTH: f64 = 100.0;
    pub const DEFAULT_HEIGHT: f64 = 100.0;
    pub const DEFAULT_COLOR: &str = "#4A90D9";
    pub const DEFAULT_TEXT_COLOR: &str = "#1F2933";
    pub const DEFAULT_STICKY_COLOR: &str = "#FFE066";
    pub const DEFAULT_FONT_SIZE: f64 = 16.0;
    pub const STICKY_NOTE_SIZE: f64 = 200.0;

    /// Position used when a creation call gives none
    pub const DEFAULT_POSITION: f64 = 100.0;

    pub const DEFAULT_FRAME_WIDTH: f64 = 400.0;
    pub const DEFAULT_FRAME_HEIGHT: f64 = 300.0;

    /// Gap between objects placed by layout tools (pixels)
    pub const LAYOUT_SPACING: f64 = 20.0;
}

/// Telemetry constants
pub mod telemetry {
    /// Number of recent command events kept in memory
    pub const RECENT_EVENTS: usize = 256;

    /// Canvas mutation fan-out channel capacity
    pub const EVENT_BUS_CAPACITY: usize = 1024;
}

/// Storage constants
pub mod storage {
    /// Default SQLite database location (relative to the project directory)
    pub const DEFAULT_DATABASE_PATH: &str = ".canvasflow/canvas.db";
}
