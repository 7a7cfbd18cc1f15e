use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the host side drives a session.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DriveMode {
    /// Ping on a fixed interval and shut the session down once it has
    /// answered enough pings.
    #[default]
    #[strum(to_string = "oneshot", serialize = "one_shot")]
    #[serde(rename = "oneshot", alias = "one_shot")]
    OneShot,
    /// Forward external input until it closes; never ping.
    Persistent,
}

/// Errors encountered while parsing a [`DriveMode`] from text.
pub type DriveModeParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("oneshot", DriveMode::OneShot)]
    #[case("ONE_SHOT", DriveMode::OneShot)]
    #[case("persistent", DriveMode::Persistent)]
    fn parses_case_insensitively(#[case] raw: &str, #[case] expected: DriveMode) {
        assert_eq!(DriveMode::from_str(raw).expect("known mode"), expected);
    }

    #[test]
    fn rejects_unknown_modes() {
        assert!(DriveMode::from_str("forever").is_err());
    }

    #[test]
    fn displays_canonical_name() {
        assert_eq!(DriveMode::OneShot.to_string(), "oneshot");
        assert_eq!(DriveMode::Persistent.to_string(), "persistent");
    }
}
