//! Message types exchanged with the test driver.
//!
//! Both directions use JSONL over the driver's socket: one JSON object per
//! newline-terminated line. The host writes a single [`DriverRequest`] when
//! the driver starts; the driver answers with any number of
//! [`DriverEvent`]s and closes the stream when it exits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Request written to the driver once it has been started.
///
/// # Example
///
/// ```
/// use xmnr_driver::protocol::DriverRequest;
///
/// let request = DriverRequest::new("walk-states", "ios0")
///     .with_argument("rollback", "false");
/// assert_eq!(request.operation(), "walk-states");
/// assert_eq!(request.arguments().get("rollback").map(String::as_str), Some("false"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DriverRequest {
    operation: String,
    device: String,
    #[serde(default)]
    arguments: BTreeMap<String, String>,
}

impl DriverRequest {
    /// Creates a request without arguments.
    #[must_use]
    pub fn new(operation: impl Into<String>, device: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            device: device.into(),
            arguments: BTreeMap::new(),
        }
    }

    /// Adds an argument, replacing any earlier value for the same tag.
    #[must_use]
    pub fn with_argument(mut self, tag: impl Into<String>, value: impl Into<String>) -> Self {
        self.arguments.insert(tag.into(), value.into());
        self
    }

    /// Operation name.
    #[must_use]
    pub fn operation(&self) -> &str {
        self.operation.as_str()
    }

    /// Target device.
    #[must_use]
    pub fn device(&self) -> &str {
        self.device.as_str()
    }

    /// Resolved operation arguments keyed by tag.
    #[must_use]
    pub const fn arguments(&self) -> &BTreeMap<String, String> {
        &self.arguments
    }
}

/// Event reported by the driver while it runs.
///
/// The `kind` field is the discriminator on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverEvent {
    /// Raw output produced by the test run.
    Output {
        /// Text payload, usually one line.
        data: String,
    },
    /// A progress note such as "applying state X".
    Progress {
        /// Progress text.
        message: String,
    },
    /// Outcome of visiting one recorded state.
    State {
        /// State name.
        name: String,
        /// Whether the transition into the state succeeded.
        passed: bool,
    },
    /// A failure the driver wants surfaced to the operator.
    Error {
        /// Diagnostic text.
        message: String,
    },
    /// Final summary of the run.
    Summary {
        /// Summary text shown to the operator on success.
        text: String,
    },
}
