//! Shared configuration for the duplex bridge host and session.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then an
//! optional TOML file (`--config-path` or `DUPLEX_CONFIG_PATH`), then
//! `DUPLEX_*` environment variables, and finally command-line flags. Every
//! field is optional in the merged sources; accessors apply the defaults from
//! [`defaults`] so callers never deal with missing values.
//!
//! The session-facing inputs (target specifier, preload modules and the
//! auxiliary factor seed list) can additionally be supplied through an inline
//! JSON runtime-configuration object, parsed by [`RuntimeConfig`].

mod defaults;
mod logging;
mod mode;
mod runtime;
mod target;

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use self::defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_ONESHOT_MAX_PINGS, DEFAULT_ONESHOT_PONG_TARGET,
    DEFAULT_TICK_INTERVAL, default_log_filter, default_log_format,
};
pub use self::logging::{LogFormat, LogFormatParseError};
pub use self::mode::{DriveMode, DriveModeParseError};
pub use self::runtime::{RuntimeConfig, RuntimeConfigError};
pub use self::target::{TargetResolutionError, TargetResolver, is_url_like};

/// Flags understood by the configuration loader.
///
/// Binaries use this list to split their argument vector into the portion
/// parsed as configuration and the remainder handed to the session as its
/// runtime arguments.
pub const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--target",
    "--runtime-config",
    "--read-timeout-ms",
    "--fallback-segments",
    "--search-roots",
    "--drive-mode",
    "--trace-frames",
];

/// Resolved configuration shared by the host binary and the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "DUPLEX")]
pub struct Config {
    /// Tracing filter expression, e.g. `info` or `duplex_bridge=debug`.
    pub log_filter: Option<String>,
    /// Output format for structured logs.
    pub log_format: Option<LogFormat>,
    /// Target module specifier imported when the session boots.
    pub target: Option<String>,
    /// Inline JSON runtime-configuration object.
    pub runtime_config: Option<String>,
    /// Per-read timeout on the session channel, in milliseconds.
    pub read_timeout_ms: Option<u64>,
    /// Comma-separated directory segments tried when a target import fails.
    pub fallback_segments: Option<String>,
    /// Comma-separated directories searched for a relative target after the
    /// working directory.
    pub search_roots: Option<String>,
    /// How the host drives the session.
    pub drive_mode: Option<DriveMode>,
    /// Logs every frame crossing the channel at debug level.
    pub trace_frames: Option<bool>,
}

impl Config {
    /// Returns the log filter, falling back to [`DEFAULT_LOG_FILTER`].
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Returns the log format, defaulting to JSON.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }

    /// Returns the configured target specifier, if any.
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        self.target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
    }

    /// Parses the inline runtime-configuration object.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeConfigError`] when the JSON is malformed or does not
    /// match the expected shape.
    pub fn runtime_config(&self) -> Result<RuntimeConfig, RuntimeConfigError> {
        match self.runtime_config.as_deref() {
            Some(raw) if !raw.trim().is_empty() => RuntimeConfig::parse(raw),
            _ => Ok(RuntimeConfig::default()),
        }
    }

    /// Returns the per-read timeout. `None` means reads block indefinitely.
    #[must_use]
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    /// Returns the fallback segments in declaration order.
    #[must_use]
    pub fn fallback_segments(&self) -> Vec<String> {
        split_list(self.fallback_segments.as_deref(), |segment| {
            segment.trim().trim_matches('/')
        })
    }

    /// Returns the extra target search roots in declaration order.
    #[must_use]
    pub fn search_roots(&self) -> Vec<Utf8PathBuf> {
        split_list(self.search_roots.as_deref(), str::trim)
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect()
    }

    /// Returns the drive mode, defaulting to one-shot.
    #[must_use]
    pub fn drive_mode(&self) -> DriveMode {
        self.drive_mode.unwrap_or_default()
    }

    /// Returns whether frame tracing is enabled.
    #[must_use]
    pub fn trace_frames(&self) -> bool {
        self.trace_frames.unwrap_or(false)
    }
}

fn split_list(raw: Option<&str>, clean: impl Fn(&str) -> &str) -> Vec<String> {
    raw.map(|text| {
        text.split(',')
            .map(&clean)
            .filter(|item| !item.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let config = Config::default();
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.target(), None);
        assert_eq!(config.read_timeout(), None);
        assert!(config.fallback_segments().is_empty());
        assert!(config.search_roots().is_empty());
        assert_eq!(config.drive_mode(), DriveMode::OneShot);
        assert!(!config.trace_frames());
    }

    #[test]
    fn blank_target_is_treated_as_missing() {
        let config = Config {
            target: Some(String::from("   ")),
            ..Config::default()
        };
        assert_eq!(config.target(), None);
    }

    #[rstest]
    #[case::zero(Some(0), None)]
    #[case::positive(Some(250), Some(Duration::from_millis(250)))]
    #[case::absent(None, None)]
    fn read_timeout_ignores_zero(#[case] millis: Option<u64>, #[case] expected: Option<Duration>) {
        let config = Config {
            read_timeout_ms: millis,
            ..Config::default()
        };
        assert_eq!(config.read_timeout(), expected);
    }

    #[test]
    fn fallback_segments_are_split_and_trimmed() {
        let config = Config {
            fallback_segments: Some(String::from(" embed/ , ,/scripts ")),
            ..Config::default()
        };
        assert_eq!(config.fallback_segments(), vec!["embed", "scripts"]);
    }

    #[test]
    fn search_roots_keep_their_order() {
        let config = Config {
            search_roots: Some(String::from(" embed , , /opt/scripts ")),
            ..Config::default()
        };
        assert_eq!(
            config.search_roots(),
            vec![Utf8PathBuf::from("embed"), Utf8PathBuf::from("/opt/scripts")]
        );
    }

    #[test]
    fn empty_runtime_config_yields_default() {
        let config = Config {
            runtime_config: Some(String::from("  ")),
            ..Config::default()
        };
        let runtime = config.runtime_config().expect("blank config is empty");
        assert_eq!(runtime, RuntimeConfig::default());
    }
}
