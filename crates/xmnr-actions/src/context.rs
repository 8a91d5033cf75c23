//! Settings and collaborators shared by every handler.

use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use xmnr_config::{Config, DevicePaths};

use crate::devices::{DeviceDirectory, FileDeviceDirectory};

/// Run settings derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    xmnr_directory: Utf8PathBuf,
    driver_command: Utf8PathBuf,
    driver_args: Vec<String>,
    poll_interval: Duration,
    terminate_grace: Duration,
    max_message_bytes: usize,
}

impl RunSettings {
    /// Creates settings with an explicit driver and storage root.
    #[must_use]
    pub fn new(xmnr_directory: impl Into<Utf8PathBuf>, driver_command: impl Into<Utf8PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            xmnr_directory: xmnr_directory.into(),
            driver_command: driver_command.into(),
            driver_args: Vec::new(),
            poll_interval: defaults.poll_interval(),
            terminate_grace: defaults.terminate_grace(),
            max_message_bytes: defaults.max_message_bytes(),
        }
    }

    /// Copies the relevant fields from `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            xmnr_directory: config.xmnr_directory().to_owned(),
            driver_command: config.driver_command().to_owned(),
            driver_args: Vec::new(),
            poll_interval: config.poll_interval(),
            terminate_grace: config.terminate_grace(),
            max_message_bytes: config.max_message_bytes(),
        }
    }

    /// Arguments placed before the operation and device on the driver's
    /// command line.
    #[must_use]
    pub fn with_driver_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.driver_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the abort poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the grace period between `SIGTERM` and `SIGKILL`.
    #[must_use]
    pub const fn with_terminate_grace(mut self, grace: Duration) -> Self {
        self.terminate_grace = grace;
        self
    }

    /// Root of per-device storage.
    #[must_use]
    pub fn xmnr_directory(&self) -> &Utf8Path {
        self.xmnr_directory.as_path()
    }

    /// Driver program.
    #[must_use]
    pub fn driver_command(&self) -> &Utf8Path {
        self.driver_command.as_path()
    }

    /// Leading driver arguments.
    #[must_use]
    pub fn driver_args(&self) -> &[String] {
        &self.driver_args
    }

    /// Abort poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Grace period between `SIGTERM` and `SIGKILL`.
    #[must_use]
    pub const fn terminate_grace(&self) -> Duration {
        self.terminate_grace
    }

    /// Largest accepted driver message.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Storage layout for `device`.
    #[must_use]
    pub fn device_paths(&self, device: &str) -> DevicePaths {
        DevicePaths::new(&self.xmnr_directory, device)
    }
}

/// Everything a handler needs besides its own parameters.
#[derive(Clone)]
pub struct ActionContext {
    settings: RunSettings,
    devices: Arc<dyn DeviceDirectory>,
}

impl ActionContext {
    /// Creates a context from settings and a device directory.
    #[must_use]
    pub fn new(settings: RunSettings, devices: Arc<dyn DeviceDirectory>) -> Self {
        Self { settings, devices }
    }

    /// Creates a context reading devices from the inventory file below the
    /// configured xmnr directory.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let settings = RunSettings::from_config(config);
        let devices = Arc::new(FileDeviceDirectory::in_directory(settings.xmnr_directory()));
        Self::new(settings, devices)
    }

    /// Run settings.
    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Device directory.
    #[must_use]
    pub fn devices(&self) -> &dyn DeviceDirectory {
        self.devices.as_ref()
    }
}

impl std::fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let config = Config {
            xmnr_directory: Utf8PathBuf::from("/srv/xmnr"),
            driver_command: Utf8PathBuf::from("/opt/xmnr/bin/driver"),
            poll_interval_ms: 25,
            terminate_grace_ms: 750,
            max_message_bytes: 4096,
            ..Config::default()
        };

        let settings = RunSettings::from_config(&config);

        assert_eq!(settings.xmnr_directory(), "/srv/xmnr");
        assert_eq!(settings.driver_command(), "/opt/xmnr/bin/driver");
        assert_eq!(settings.poll_interval(), Duration::from_millis(25));
        assert_eq!(settings.terminate_grace(), Duration::from_millis(750));
        assert_eq!(settings.max_message_bytes(), 4096);
        assert!(settings.driver_args().is_empty());
        assert_eq!(
            settings.device_paths("ios0").test_dir(),
            "/srv/xmnr/ios0/test"
        );
    }
}
