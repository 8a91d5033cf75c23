//! Error types raised by operation handlers and the dispatcher.
//!
//! Each variant is either *structured*, meaning its text is forwarded to the
//! caller verbatim, or *opaque*, meaning the caller only sees a fixed
//! message while the full chain is logged.

use std::io;
use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use xmnr_config::DevicePathsError;
use xmnr_driver::DriverError;

use crate::devices::DeviceKind;
use crate::response::ActionResponse;

/// Failure text for faults whose detail is only logged.
pub const OPAQUE_FAILURE: &str = "Operation failed";

/// Failure text reported for aborted operations.
pub const ABORTED_FAILURE: &str = "Operation aborted";

/// Errors surfaced by operation handlers.
#[derive(Debug, Error)]
pub enum ActionError {
    /// No handler is registered for the operation name.
    #[error("Operation not implemented: {operation}")]
    UnsupportedOperation {
        /// Requested operation name.
        operation: String,
    },

    /// The session already has a running operation.
    #[error("Another operation is already running for session {usid}/{thandle}")]
    SessionBusy {
        /// User session identifier.
        usid: u32,
        /// Transaction handle.
        thandle: i32,
    },

    /// A parameter was missing or had an unusable value.
    #[error("invalid parameter '{tag}': {message}")]
    InvalidParameter {
        /// Parameter tag.
        tag: String,
        /// Why the value was rejected.
        message: String,
    },

    /// The device directory has no entry for the device.
    #[error("device '{device}' not found")]
    DeviceNotFound {
        /// Requested device name.
        device: String,
    },

    /// The device exists but cannot be tested.
    #[error("device '{device}' has unsupported type '{kind}'")]
    UnsupportedDevice {
        /// Device name.
        device: String,
        /// Device kind reported by the directory.
        kind: DeviceKind,
    },

    /// The named state is not recorded for the device.
    #[error("state '{state}' not found for device '{device}'")]
    StateNotFound {
        /// Device name.
        device: String,
        /// State name.
        state: String,
    },

    /// A state with the same name is already recorded.
    #[error("state '{state}' already exists for device '{device}'")]
    StateExists {
        /// Device name.
        device: String,
        /// State name.
        state: String,
    },

    /// Reading or writing the state store failed.
    #[error("failed to {operation} '{path}': {source}")]
    Storage {
        /// Short description of the failed step.
        operation: &'static str,
        /// Path involved in the failure.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The test driver ran but reported failure.
    #[error("{detail}")]
    ChildProcessFailure {
        /// Collected driver diagnostics.
        detail: String,
    },

    /// The operation was cancelled by an abort request.
    #[error("Operation aborted")]
    Aborted,

    /// Supervising the test driver failed.
    #[error("test driver supervision failed: {0}")]
    Driver(#[from] DriverError),

    /// An invariant was violated inside the action layer.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

impl ActionError {
    /// Creates an invalid parameter error.
    #[must_use]
    pub fn invalid_parameter(tag: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Creates a storage error from an I/O failure.
    #[must_use]
    pub fn storage(operation: &'static str, path: impl Into<Utf8PathBuf>, source: io::Error) -> Self {
        Self::Storage {
            operation,
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a child process failure carrying `detail` verbatim.
    #[must_use]
    pub fn child_failure(detail: impl Into<String>) -> Self {
        Self::ChildProcessFailure {
            detail: detail.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` for errors whose detail is hidden from the caller.
    #[must_use]
    pub const fn is_opaque(&self) -> bool {
        matches!(self, Self::Driver(_) | Self::Internal { .. })
    }

    /// Translates the error into the response the caller sees.
    ///
    /// Opaque errors collapse to [`OPAQUE_FAILURE`]; logging their detail is
    /// the caller's responsibility.
    #[must_use]
    pub fn to_response(&self) -> ActionResponse {
        match self {
            Self::UnsupportedOperation { .. } | Self::SessionBusy { .. } | Self::Aborted => {
                ActionResponse::failure(self.to_string())
            }
            Self::InvalidParameter { .. }
            | Self::DeviceNotFound { .. }
            | Self::UnsupportedDevice { .. }
            | Self::StateNotFound { .. }
            | Self::StateExists { .. }
            | Self::Storage { .. }
            | Self::ChildProcessFailure { .. } => ActionResponse::error(self.to_string()),
            Self::Driver(_) | Self::Internal { .. } => ActionResponse::failure(OPAQUE_FAILURE),
        }
    }
}

impl From<DevicePathsError> for ActionError {
    fn from(error: DevicePathsError) -> Self {
        match error {
            DevicePathsError::Create { path, source } => Self::Storage {
                operation: "prepare directory",
                path,
                source: Arc::new(source),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(
        ActionError::UnsupportedOperation { operation: "fly".into() },
        ActionResponse::failure("Operation not implemented: fly")
    )]
    #[case(ActionError::Aborted, ActionResponse::failure("Operation aborted"))]
    #[case(
        ActionError::SessionBusy { usid: 3, thandle: -1 },
        ActionResponse::failure("Another operation is already running for session 3/-1")
    )]
    #[case(
        ActionError::DeviceNotFound { device: "ios9".into() },
        ActionResponse::error("device 'ios9' not found")
    )]
    #[case(
        ActionError::UnsupportedDevice { device: "gen0".into(), kind: DeviceKind::Generic },
        ActionResponse::error("device 'gen0' has unsupported type 'generic'")
    )]
    #[case(
        ActionError::child_failure("commit rejected"),
        ActionResponse::error("commit rejected")
    )]
    #[case(ActionError::internal("slot poisoned"), ActionResponse::failure("Operation failed"))]
    #[case(
        ActionError::Driver(DriverError::ProcessReaped),
        ActionResponse::failure("Operation failed")
    )]
    fn translates_to_caller_response(#[case] error: ActionError, #[case] expected: ActionResponse) {
        assert_eq!(error.to_response(), expected);
    }

    #[test]
    fn storage_errors_name_the_path() {
        let error = ActionError::storage(
            "read state",
            "/srv/xmnr/ios0/states/base.state.cfg",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        let detail = error.to_response().error.expect("structured").detail;
        assert!(detail.starts_with("failed to read state '/srv/xmnr/ios0/states/base.state.cfg'"));
        assert!(!error.is_opaque());
    }
}
