//! Unit tests for driver error types.

use std::io;

use rstest::rstest;

use super::*;

#[test]
fn binary_not_found_names_program() {
    let error = DriverError::BinaryNotFound {
        program: "drned-runner".into(),
        source: Arc::new(io::Error::from(io::ErrorKind::NotFound)),
    };
    let message = error.to_string();
    assert!(message.contains("drned-runner"), "missing program: {message}");
    assert!(message.contains("not found"), "missing reason: {message}");
}

#[test]
fn io_error_names_operation() {
    let error = DriverError::io("read driver output", io::Error::other("reset"));
    let message = error.to_string();
    assert!(message.contains("read driver output"), "missing step: {message}");
    assert!(message.contains("reset"), "missing cause: {message}");
}

#[rstest]
#[case::too_large(DriverError::MessageTooLarge { size: 10, max_size: 4 }, true)]
#[case::malformed(
    DriverError::MalformedMessage { message: "bad".into(), source: None },
    true
)]
#[case::reaped(DriverError::ProcessReaped, false)]
#[case::io(DriverError::io("wait for driver", io::Error::other("x")), false)]
fn classifies_protocol_violations(#[case] error: DriverError, #[case] expected: bool) {
    assert_eq!(error.is_protocol_violation(), expected);
}

#[test]
fn malformed_keeps_json_source() {
    let source = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
    let error = DriverError::malformed(source);
    assert!(std::error::Error::source(&error).is_some());
}
