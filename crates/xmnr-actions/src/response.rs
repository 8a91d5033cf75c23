//! Terminal result record returned for every invoked operation.
//!
//! The record carries three independently optional keys. A success sets
//! `success`, a structured fault sets `error`, and a refusal, abort or
//! opaque fault sets `failure`. The dispatcher guarantees exactly one key is
//! populated on every response it returns.

use serde::{Deserialize, Serialize};

/// Structured error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable diagnostic forwarded verbatim to the caller.
    pub detail: String,
}

/// Result of one operation.
///
/// # Example
///
/// ```
/// use xmnr_actions::ActionResponse;
///
/// let response = ActionResponse::success("3 states passed");
/// assert_eq!(
///     serde_json::to_string(&response).unwrap(),
///     r#"{"success":"3 states passed"}"#
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    /// Success text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,
    /// Structured error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    /// Failure text for refusals, aborts and opaque faults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ActionResponse {
    /// Creates a success response.
    #[must_use]
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            success: Some(text.into()),
            ..Self::default()
        }
    }

    /// Creates a structured error response.
    #[must_use]
    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            error: Some(ErrorDetail {
                detail: detail.into(),
            }),
            ..Self::default()
        }
    }

    /// Creates a failure response.
    #[must_use]
    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            failure: Some(text.into()),
            ..Self::default()
        }
    }

    /// Returns `true` when the response reports success.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success.is_some()
    }

    /// Number of populated keys. Well-formed responses have exactly one.
    #[must_use]
    pub fn populated_keys(&self) -> usize {
        usize::from(self.success.is_some())
            + usize::from(self.error.is_some())
            + usize::from(self.failure.is_some())
    }
}
