use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How `duplexd` renders its tracing output on stderr.
///
/// Set with `--log-format` or `DUPLEX_LOG_FORMAT`; stdout is never used, so
/// either choice leaves the session channel untouched.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One flattened JSON object per event, frame fields included.
    #[default]
    Json,
    /// Terse single-line text for watching a drive by hand.
    Compact,
}

/// Error returned when `--log-format` names no known format.
pub type LogFormatParseError = strum::ParseError;
