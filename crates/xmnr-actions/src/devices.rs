//! Device lookup for operation handlers.
//!
//! Handlers only need a device's name and management kind. The
//! [`DeviceDirectory`] trait is the seam through which they obtain it, so
//! tests and embedding hosts can supply their own source.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ActionError;

/// Tracing target for device lookups.
const DEVICES_TARGET: &str = "xmnr_actions::devices";

/// File name of the device inventory below the xmnr directory.
pub const DEVICE_INVENTORY_FILE: &str = "devices.json";

/// How a device is managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Device managed over NETCONF.
    Netconf,
    /// Device managed through a CLI NED.
    Cli,
    /// Generic device; not testable.
    Generic,
}

impl DeviceKind {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Netconf => "netconf",
            Self::Cli => "cli",
            Self::Generic => "generic",
        }
    }

    /// Returns `true` when the test driver can exercise this kind.
    #[must_use]
    pub const fn is_testable(self) -> bool {
        !matches!(self, Self::Generic)
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device known to the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name.
    pub name: String,
    /// Management kind.
    pub kind: DeviceKind,
}

/// Source of device records.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceDirectory: Send + Sync {
    /// Looks up a device by name. `Ok(None)` means the device is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying inventory cannot be read.
    fn lookup(&self, name: &str) -> Result<Option<DeviceInfo>, ActionError>;
}

/// Resolves a device, rejecting unknown and untestable ones.
///
/// # Errors
///
/// Returns [`ActionError::DeviceNotFound`] or
/// [`ActionError::UnsupportedDevice`], or any lookup error.
pub fn resolve_testable(
    directory: &dyn DeviceDirectory,
    name: &str,
) -> Result<DeviceInfo, ActionError> {
    let device = directory
        .lookup(name)?
        .ok_or_else(|| ActionError::DeviceNotFound {
            device: name.to_owned(),
        })?;
    if !device.kind.is_testable() {
        return Err(ActionError::UnsupportedDevice {
            device: device.name,
            kind: device.kind,
        });
    }
    Ok(device)
}

/// In-memory device directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticDevices {
    devices: BTreeMap<String, DeviceKind>,
}

impl StaticDevices {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a device.
    #[must_use]
    pub fn with_device(mut self, name: impl Into<String>, kind: DeviceKind) -> Self {
        self.devices.insert(name.into(), kind);
        self
    }
}

impl FromIterator<DeviceInfo> for StaticDevices {
    fn from_iter<I: IntoIterator<Item = DeviceInfo>>(iter: I) -> Self {
        Self {
            devices: iter
                .into_iter()
                .map(|device| (device.name, device.kind))
                .collect(),
        }
    }
}

impl DeviceDirectory for StaticDevices {
    fn lookup(&self, name: &str) -> Result<Option<DeviceInfo>, ActionError> {
        Ok(self.devices.get(name).map(|kind| DeviceInfo {
            name: name.to_owned(),
            kind: *kind,
        }))
    }
}

/// Device directory backed by a JSON inventory file.
///
/// The file holds an array of `{"name": ..., "kind": ...}` records and is
/// re-read on every lookup. A missing file is an empty inventory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDeviceDirectory {
    path: Utf8PathBuf,
}

impl FileDeviceDirectory {
    /// Uses the inventory at `path`.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses `devices.json` below the xmnr directory.
    #[must_use]
    pub fn in_directory(xmnr_directory: &Utf8Path) -> Self {
        Self::new(xmnr_directory.join(DEVICE_INVENTORY_FILE))
    }

    /// Inventory file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        self.path.as_path()
    }

    fn load(&self) -> Result<Vec<DeviceInfo>, ActionError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                debug!(target: DEVICES_TARGET, path = %self.path, "device inventory absent");
                return Ok(Vec::new());
            }
            Err(error) => return Err(ActionError::storage("read device inventory", &self.path, error)),
        };
        serde_json::from_str(&text).map_err(|error| {
            ActionError::storage(
                "parse device inventory",
                &self.path,
                io::Error::new(io::ErrorKind::InvalidData, error),
            )
        })
    }
}

impl DeviceDirectory for FileDeviceDirectory {
    fn lookup(&self, name: &str) -> Result<Option<DeviceInfo>, ActionError> {
        Ok(self.load()?.into_iter().find(|device| device.name == name))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path.to_path_buf()).expect("utf-8 path")
    }

    #[rstest]
    #[case(DeviceKind::Netconf, true)]
    #[case(DeviceKind::Cli, true)]
    #[case(DeviceKind::Generic, false)]
    fn only_generic_devices_are_untestable(#[case] kind: DeviceKind, #[case] testable: bool) {
        assert_eq!(kind.is_testable(), testable);
    }

    #[test]
    fn resolve_rejects_unknown_devices() {
        let mut directory = MockDeviceDirectory::new();
        directory
            .expect_lookup()
            .withf(|name| name == "ghost")
            .times(1)
            .returning(|_| Ok(None));

        let error = resolve_testable(&directory, "ghost").expect_err("unknown device");

        assert!(matches!(error, ActionError::DeviceNotFound { device } if device == "ghost"));
    }

    #[test]
    fn resolve_rejects_generic_devices() {
        let mut directory = MockDeviceDirectory::new();
        directory.expect_lookup().returning(|name| {
            Ok(Some(DeviceInfo {
                name: name.to_owned(),
                kind: DeviceKind::Generic,
            }))
        });

        let error = resolve_testable(&directory, "gen0").expect_err("generic device");

        assert!(matches!(
            error,
            ActionError::UnsupportedDevice {
                kind: DeviceKind::Generic,
                ..
            }
        ));
    }

    #[test]
    fn resolve_propagates_lookup_failures() {
        let mut directory = MockDeviceDirectory::new();
        directory
            .expect_lookup()
            .returning(|_| Err(ActionError::internal("inventory offline")));

        let error = resolve_testable(&directory, "ios0").expect_err("lookup failure");

        assert!(matches!(error, ActionError::Internal { .. }));
    }

    #[test]
    fn static_devices_answer_lookups() {
        let devices = StaticDevices::new().with_device("ios0", DeviceKind::Cli);
        let found = devices.lookup("ios0").expect("lookup");
        assert_eq!(
            found,
            Some(DeviceInfo {
                name: "ios0".into(),
                kind: DeviceKind::Cli
            })
        );
        assert_eq!(devices.lookup("ios1").expect("lookup"), None);
    }

    #[test]
    fn file_directory_reads_inventory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = utf8(temp.path());
        fs::write(
            root.join(DEVICE_INVENTORY_FILE),
            r#"[{"name":"ios0","kind":"cli"},{"name":"junos0","kind":"netconf"}]"#,
        )
        .expect("write inventory");

        let directory = FileDeviceDirectory::in_directory(&root);

        let found = directory.lookup("junos0").expect("lookup");
        assert_eq!(found.map(|device| device.kind), Some(DeviceKind::Netconf));
        assert_eq!(directory.lookup("ios9").expect("lookup"), None);
    }

    #[test]
    fn missing_inventory_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let directory = FileDeviceDirectory::in_directory(&utf8(temp.path()));
        assert_eq!(directory.lookup("ios0").expect("lookup"), None);
    }

    #[test]
    fn malformed_inventory_is_a_storage_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = utf8(temp.path());
        fs::write(root.join(DEVICE_INVENTORY_FILE), "{not json").expect("write inventory");

        let error = FileDeviceDirectory::in_directory(&root)
            .lookup("ios0")
            .expect_err("parse failure");

        assert!(matches!(
            error,
            ActionError::Storage {
                operation: "parse device inventory",
                ..
            }
        ));
    }
}
