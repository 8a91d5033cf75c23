//! Shared configuration for the XMNR action core and the `xmnr` binary.
//!
//! Configuration is layered by `ortho_config`: built-in defaults, then a
//! configuration file (`--config-path` or `XMNR_CONFIG_PATH`), then
//! `XMNR_*` environment variables, then command-line flags. The resolved
//! [`Config`] is read once at startup; the installation root it names must
//! exist before any operation is dispatched.

mod defaults;
mod logging;
mod paths;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_DRIVER_COMMAND, DEFAULT_LOG_FILTER, DEFAULT_MAX_MESSAGE_BYTES,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_TERMINATE_GRACE_MS, default_driver_command,
    default_log_filter, default_log_filter_string, default_log_format, default_max_message_bytes,
    default_poll_interval_ms, default_terminate_grace_ms, default_xmnr_directory,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{DISABLED_SUFFIX, DevicePaths, DevicePathsError, STATE_SUFFIX};

/// Resolved configuration for the action core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "XMNR")]
pub struct Config {
    /// Root of the host installation. Must name an existing directory.
    #[serde(default)]
    pub install_dir: Option<Utf8PathBuf>,
    /// Directory holding per-device states and driver working directories.
    #[ortho_config(default = default_xmnr_directory())]
    #[serde(default = "default_xmnr_directory")]
    pub xmnr_directory: Utf8PathBuf,
    /// Program launched as the test driver.
    #[ortho_config(default = default_driver_command())]
    #[serde(default = "default_driver_command")]
    pub driver_command: Utf8PathBuf,
    /// Interval between abort checks while an operation waits, in milliseconds.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Grace period between SIGTERM and SIGKILL for the driver, in milliseconds.
    #[ortho_config(default = DEFAULT_TERMINATE_GRACE_MS)]
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
    /// Largest single message accepted from the driver, in bytes.
    #[ortho_config(default = DEFAULT_MAX_MESSAGE_BYTES)]
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
    /// Tracing filter expression.
    #[ortho_config(default = default_log_filter_string())]
    #[serde(default = "default_log_filter_string")]
    pub log_filter: String,
    /// Tracing output format.
    #[ortho_config(default = default_log_format())]
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: None,
            xmnr_directory: default_xmnr_directory(),
            driver_command: default_driver_command(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            terminate_grace_ms: DEFAULT_TERMINATE_GRACE_MS,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Installation root, when configured.
    #[must_use]
    pub fn install_dir(&self) -> Option<&Utf8Path> {
        self.install_dir.as_deref()
    }

    /// Directory holding per-device data.
    #[must_use]
    pub fn xmnr_directory(&self) -> &Utf8Path {
        self.xmnr_directory.as_path()
    }

    /// Program launched as the test driver.
    #[must_use]
    pub fn driver_command(&self) -> &Utf8Path {
        self.driver_command.as_path()
    }

    /// Interval between abort checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Grace period granted to a terminated driver.
    #[must_use]
    pub const fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }

    /// Largest message accepted from the driver.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Tracing output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Checks that the installation root is configured and is a directory.
    ///
    /// The host treats a failure here as fatal: nothing may be dispatched
    /// until the installation root resolves.
    ///
    /// # Errors
    ///
    /// Returns [`InstallDirError`] when the root is unset, missing, or not a
    /// directory.
    pub fn validate_install_dir(&self) -> Result<&Utf8Path, InstallDirError> {
        let path = self.install_dir().ok_or(InstallDirError::Unset)?;
        let metadata = path
            .metadata()
            .map_err(|source| InstallDirError::Inaccessible {
                path: path.to_owned(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(InstallDirError::NotADirectory {
                path: path.to_owned(),
            });
        }
        Ok(path)
    }
}

/// Errors raised while validating the installation root.
#[derive(Debug, Error)]
pub enum InstallDirError {
    /// No installation root was configured.
    #[error("installation directory is not configured (set XMNR_INSTALL_DIR)")]
    Unset,
    /// The installation root could not be inspected.
    #[error("installation directory '{path}' is not accessible: {source}")]
    Inaccessible {
        /// Configured path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The installation root exists but is not a directory.
    #[error("installation directory '{path}' is not a directory")]
    NotADirectory {
        /// Configured path.
        path: Utf8PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf8 path")
    }

    #[test]
    fn defaults_are_consistent() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.terminate_grace(), Duration::from_millis(500));
        assert_eq!(config.max_message_bytes(), 1024 * 1024);
        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.log_format(), LogFormat::Json);
        assert_eq!(config.driver_command(), "xmnr-driver");
        assert!(config.xmnr_directory().ends_with("xmnr"));
    }

    #[test]
    fn install_dir_must_be_configured() {
        let config = Config::default();
        assert!(matches!(
            config.validate_install_dir(),
            Err(InstallDirError::Unset)
        ));
    }

    #[test]
    fn install_dir_must_exist() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = Config {
            install_dir: Some(utf8(&temp.path().join("missing"))),
            ..Config::default()
        };
        assert!(matches!(
            config.validate_install_dir(),
            Err(InstallDirError::Inaccessible { .. })
        ));
    }

    #[test]
    fn install_dir_rejects_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let file = temp.path().join("ncs");
        fs::write(&file, b"").expect("write file");
        let config = Config {
            install_dir: Some(utf8(&file)),
            ..Config::default()
        };
        assert!(matches!(
            config.validate_install_dir(),
            Err(InstallDirError::NotADirectory { .. })
        ));
    }

    #[test]
    fn install_dir_accepts_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = utf8(temp.path());
        let config = Config {
            install_dir: Some(root.clone()),
            ..Config::default()
        };
        assert_eq!(config.validate_install_dir().expect("valid"), root);
    }
}
