use camino::Utf8PathBuf;
use std::env;

#[cfg(unix)]
use dirs::data_local_dir;

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default program launched as the test driver.
pub const DEFAULT_DRIVER_COMMAND: &str = "xmnr-driver";

/// Default interval between abort checks while an operation is blocked.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Default time a terminated driver is given before it is killed.
pub const DEFAULT_TERMINATE_GRACE_MS: u64 = 500;

/// Default upper bound for a single message read from the driver.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Default log filter expression.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default driver program.
#[must_use]
pub fn default_driver_command() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DRIVER_COMMAND)
}

/// Default polling interval in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Default termination grace period in milliseconds.
#[must_use]
pub const fn default_terminate_grace_ms() -> u64 {
    DEFAULT_TERMINATE_GRACE_MS
}

/// Default maximum message size in bytes.
#[must_use]
pub const fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

/// Computes the default directory holding per-device XMNR data.
///
/// Prefers the user's local data directory and falls back to the system
/// temporary directory when none is available.
#[must_use]
pub fn default_xmnr_directory() -> Utf8PathBuf {
    let mut base = data_base_directory().unwrap_or_else(fallback_base_directory);
    base.push("xmnr");
    base
}

#[cfg(unix)]
fn data_base_directory() -> Option<Utf8PathBuf> {
    data_local_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
}

#[cfg(not(unix))]
fn data_base_directory() -> Option<Utf8PathBuf> {
    None
}

fn fallback_base_directory() -> Utf8PathBuf {
    let candidate = env::temp_dir();
    Utf8PathBuf::from_path_buf(candidate).unwrap_or_else(|_| Utf8PathBuf::from("/tmp"))
}
