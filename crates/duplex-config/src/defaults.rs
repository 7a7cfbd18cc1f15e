use std::time::Duration;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Interval between host pings in one-shot mode.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);

/// Pongs the host waits for before completing a one-shot drive.
pub const DEFAULT_ONESHOT_PONG_TARGET: u64 = 3;

/// Pings after which a one-shot drive gives up and shuts the session down.
pub const DEFAULT_ONESHOT_MAX_PINGS: u64 = 10;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}
