//! Unit tests for bridge error types.

use rstest::rstest;

use super::*;

#[test]
fn failed_handler_error_displays_message_verbatim() {
    let error = HandlerError::failed("boom");
    assert_eq!(error.to_string(), "boom");
    assert!(!error.is_fatal());
}

#[test]
fn fatal_handler_error_is_flagged() {
    let error = HandlerError::fatal("FATAL");
    assert!(error.is_fatal());
    assert_eq!(error.message(), "FATAL");
    assert!(error.to_string().contains("fatal"));
}

#[rstest]
#[case::not_found(ImportError::not_found("builtin:missing"), "not found")]
#[case::failed(ImportError::failed("builtin:broken", "syntax error"), "syntax error")]
fn import_error_message_includes_detail(#[case] error: ImportError, #[case] expected: &str) {
    let message = error.to_string();
    assert!(message.contains(expected), "message: {message}");
    assert!(message.contains(error.specifier()), "message: {message}");
}

#[test]
fn preload_error_names_the_specifier() {
    let error = LoaderError::Preload {
        specifier: String::from("builtin:extra"),
        source: ImportError::not_found("builtin:extra"),
    };
    assert!(error.to_string().contains("builtin:extra"));
}

#[test]
fn channel_timeout_reports_duration() {
    let error = ChannelError::TimedOut { timeout_ms: 1500 };
    assert!(error.to_string().contains("1500ms"));
}

#[rstest]
#[case::missing_target(SessionError::MissingTarget, true)]
#[case::loader(
    SessionError::Loader(LoaderError::DuplicateModule { specifier: String::from("a") }),
    true
)]
#[case::channel(SessionError::Channel(ChannelError::Closed), false)]
#[case::fatal(SessionError::Fatal { message: String::from("FATAL") }, false)]
fn bootstrap_errors_are_classified(#[case] error: SessionError, #[case] expected: bool) {
    assert_eq!(error.is_bootstrap(), expected);
}
