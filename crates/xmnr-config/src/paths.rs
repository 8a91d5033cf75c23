//! Derives the on-disk layout used for per-device XMNR data.
//!
//! Every device owns a directory below the configured XMNR directory. The
//! recorded states live in `states/` and the test driver runs with `test/`
//! as its working directory. Both the action handlers and the read-only
//! state provider resolve paths through [`DevicePaths`] so they agree on the
//! layout.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::Config;

/// File suffix of an enabled recorded state.
pub const STATE_SUFFIX: &str = ".state.cfg";

/// Suffix appended to a state file when the state is disabled.
pub const DISABLED_SUFFIX: &str = ".disabled";

/// Canonical paths for one device's XMNR data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    device_dir: Utf8PathBuf,
    states_dir: Utf8PathBuf,
    test_dir: Utf8PathBuf,
}

impl DevicePaths {
    /// Derives the paths for `device` below `root`.
    #[must_use]
    pub fn new(root: &Utf8Path, device: &str) -> Self {
        let device_dir = root.join(device);
        Self {
            states_dir: device_dir.join("states"),
            test_dir: device_dir.join("test"),
            device_dir,
        }
    }

    /// Derives the paths for `device` from the shared configuration.
    #[must_use]
    pub fn from_config(config: &Config, device: &str) -> Self {
        Self::new(config.xmnr_directory(), device)
    }

    /// Directory holding everything recorded for the device.
    #[must_use]
    pub fn device_dir(&self) -> &Utf8Path {
        self.device_dir.as_path()
    }

    /// Directory holding recorded state files.
    #[must_use]
    pub fn states_dir(&self) -> &Utf8Path {
        self.states_dir.as_path()
    }

    /// Working directory handed to the test driver.
    #[must_use]
    pub fn test_dir(&self) -> &Utf8Path {
        self.test_dir.as_path()
    }

    /// Path of the enabled state file for `state`.
    #[must_use]
    pub fn state_file(&self, state: &str) -> Utf8PathBuf {
        self.states_dir.join(format!("{state}{STATE_SUFFIX}"))
    }

    /// Path of the disabled state file for `state`.
    #[must_use]
    pub fn disabled_state_file(&self, state: &str) -> Utf8PathBuf {
        self.states_dir
            .join(format!("{state}{STATE_SUFFIX}{DISABLED_SUFFIX}"))
    }

    /// Creates the states and test directories when missing.
    ///
    /// # Errors
    ///
    /// Returns [`DevicePathsError::Create`] when a directory cannot be
    /// created.
    pub fn prepare(&self) -> Result<(), DevicePathsError> {
        for dir in [&self.states_dir, &self.test_dir] {
            fs::create_dir_all(dir).map_err(|source| DevicePathsError::Create {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Errors raised while preparing device directories.
#[derive(Debug, Error)]
pub enum DevicePathsError {
    /// Creating a device directory failed.
    #[error("failed to prepare directory '{path}': {source}")]
    Create {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}
