//! Per-device store of recorded configuration states.
//!
//! A state named `base` for device `ios0` lives in
//! `<xmnr_directory>/ios0/states/base.state.cfg`. Disabling a state renames
//! the file with a trailing `.disabled`, which hides it from the driver
//! without losing its contents.

use std::collections::BTreeSet;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};
use xmnr_config::{DISABLED_SUFFIX, DevicePaths, STATE_SUFFIX};

use crate::errors::ActionError;
use crate::params::validate_state_name;

/// Tracing target for state store operations.
const STATES_TARGET: &str = "xmnr_actions::states";

/// A recorded state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct StateEntry {
    /// State name.
    pub name: String,
    /// Whether the state is hidden from the driver.
    pub disabled: bool,
}

/// Read-only view of recorded states, for hosts that display them.
pub trait StatesProvider: Send + Sync {
    /// Lists the states recorded for `device`, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Storage`] when the store cannot be read.
    fn recorded_states(&self, device: &str) -> Result<Vec<StateEntry>, ActionError>;
}

/// [`StatesProvider`] reading the on-disk store below a root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStatesProvider {
    root: Utf8PathBuf,
}

impl StoreStatesProvider {
    /// Reads states below `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl StatesProvider for StoreStatesProvider {
    fn recorded_states(&self, device: &str) -> Result<Vec<StateEntry>, ActionError> {
        StateStore::new(DevicePaths::new(&self.root, device), device).list()
    }
}

/// Where a state currently lives.
enum Location {
    Enabled(Utf8PathBuf),
    Disabled(Utf8PathBuf),
}

/// State store for one device.
#[derive(Debug, Clone)]
pub struct StateStore {
    paths: DevicePaths,
    device: String,
}

impl StateStore {
    /// Opens the store described by `paths`.
    #[must_use]
    pub fn new(paths: DevicePaths, device: impl Into<String>) -> Self {
        Self {
            paths,
            device: device.into(),
        }
    }

    /// Lists recorded states sorted by name.
    ///
    /// A missing states directory is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Storage`] when the directory cannot be read.
    pub fn list(&self) -> Result<Vec<StateEntry>, ActionError> {
        let dir = self.paths.states_dir();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(ActionError::storage("list states", dir, error)),
        };
        let mut states = Vec::new();
        for item in entries {
            let entry = item.map_err(|error| ActionError::storage("list states", dir, error))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(STATE_SUFFIX) {
                states.push(StateEntry {
                    name: stem.to_owned(),
                    disabled: false,
                });
            } else if let Some(stem) = name
                .strip_suffix(DISABLED_SUFFIX)
                .and_then(|rest| rest.strip_suffix(STATE_SUFFIX))
            {
                states.push(StateEntry {
                    name: stem.to_owned(),
                    disabled: true,
                });
            }
        }
        states.sort();
        Ok(states)
    }

    /// Renders the listing shown by `list-states`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Storage`] when the directory cannot be read.
    pub fn render_listing(&self) -> Result<String, ActionError> {
        let states = self.list()?;
        if states.is_empty() {
            return Ok("No states recorded".to_owned());
        }
        let lines: Vec<String> = states
            .iter()
            .map(|state| {
                if state.disabled {
                    format!("{} (disabled)", state.name)
                } else {
                    state.name.clone()
                }
            })
            .collect();
        Ok(lines.join("\n"))
    }

    /// Returns the contents of a state, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::StateNotFound`] or [`ActionError::Storage`].
    pub fn view(&self, name: &str) -> Result<String, ActionError> {
        let path = match self.locate(name)? {
            Location::Enabled(path) | Location::Disabled(path) => path,
        };
        fs::read_to_string(&path).map_err(|error| ActionError::storage("read state", path, error))
    }

    /// Deletes a state, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::StateNotFound`] or [`ActionError::Storage`].
    pub fn delete(&self, name: &str) -> Result<(), ActionError> {
        let path = match self.locate(name)? {
            Location::Enabled(path) | Location::Disabled(path) => path,
        };
        fs::remove_file(&path).map_err(|error| ActionError::storage("delete state", &path, error))?;
        info!(target: STATES_TARGET, device = %self.device, state = name, "deleted state");
        Ok(())
    }

    /// Hides a state from the driver. Returns `false` if it was already
    /// disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::StateNotFound`] or [`ActionError::Storage`].
    pub fn disable(&self, name: &str) -> Result<bool, ActionError> {
        match self.locate(name)? {
            Location::Disabled(_) => Ok(false),
            Location::Enabled(path) => {
                let target = self.paths.disabled_state_file(name);
                fs::rename(&path, &target)
                    .map_err(|error| ActionError::storage("disable state", &path, error))?;
                info!(target: STATES_TARGET, device = %self.device, state = name, "disabled state");
                Ok(true)
            }
        }
    }

    /// Makes a disabled state visible again. Returns `false` if it was
    /// already enabled.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::StateNotFound`] or [`ActionError::Storage`].
    pub fn enable(&self, name: &str) -> Result<bool, ActionError> {
        match self.locate(name)? {
            Location::Enabled(_) => Ok(false),
            Location::Disabled(path) => {
                let target = self.paths.state_file(name);
                fs::rename(&path, &target)
                    .map_err(|error| ActionError::storage("enable state", &path, error))?;
                info!(target: STATES_TARGET, device = %self.device, state = name, "enabled state");
                Ok(true)
            }
        }
    }

    /// Copies state files into the store.
    ///
    /// `source` is either one file or a directory whose regular files are
    /// all imported. Each state is named after its file, minus a trailing
    /// `.state.cfg` or, failing that, its last extension. Existing states
    /// are refused unless `overwrite` is set; two files yielding the same
    /// name are always refused. Returns the imported names.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::StateExists`], [`ActionError::InvalidParameter`]
    /// for files that do not yield a usable name, or [`ActionError::Storage`].
    pub fn import(&self, source: &Utf8Path, overwrite: bool) -> Result<Vec<String>, ActionError> {
        let files = import_sources(source)?;
        let planned = files
            .iter()
            .map(|file| state_name_for(file).map(|name| (file, name)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut seen = BTreeSet::new();
        for (_, name) in &planned {
            // Source files must yield distinct names, whatever `overwrite` says.
            if !seen.insert(name.as_str()) {
                return Err(ActionError::StateExists {
                    device: self.device.clone(),
                    state: name.clone(),
                });
            }
        }
        if !overwrite {
            for (_, name) in &planned {
                if self.exists(name) {
                    return Err(ActionError::StateExists {
                        device: self.device.clone(),
                        state: name.clone(),
                    });
                }
            }
        }

        self.paths.prepare()?;
        let mut imported = Vec::with_capacity(planned.len());
        for (file, name) in planned {
            let target = self.paths.state_file(&name);
            fs::copy(file, &target)
                .map_err(|error| ActionError::storage("import state", file.as_path(), error))?;
            let disabled = self.paths.disabled_state_file(&name);
            if disabled.exists() {
                fs::remove_file(&disabled).map_err(|error| {
                    ActionError::storage("replace disabled state", &disabled, error)
                })?;
            }
            debug!(target: STATES_TARGET, device = %self.device, state = %name, source = %file, "imported state");
            imported.push(name);
        }
        info!(
            target: STATES_TARGET,
            device = %self.device,
            count = imported.len(),
            "imported state files"
        );
        Ok(imported)
    }

    fn exists(&self, name: &str) -> bool {
        self.paths.state_file(name).exists() || self.paths.disabled_state_file(name).exists()
    }

    fn locate(&self, name: &str) -> Result<Location, ActionError> {
        validate_state_name("state-name", name)?;
        let enabled = self.paths.state_file(name);
        if enabled.is_file() {
            return Ok(Location::Enabled(enabled));
        }
        let disabled = self.paths.disabled_state_file(name);
        if disabled.is_file() {
            return Ok(Location::Disabled(disabled));
        }
        Err(ActionError::StateNotFound {
            device: self.device.clone(),
            state: name.to_owned(),
        })
    }
}

fn import_sources(source: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ActionError> {
    let metadata =
        fs::metadata(source).map_err(|error| ActionError::storage("inspect import source", source, error))?;
    if !metadata.is_dir() {
        return Ok(vec![source.to_owned()]);
    }
    let mut files = Vec::new();
    let entries = source
        .read_dir_utf8()
        .map_err(|error| ActionError::storage("list import directory", source, error))?;
    for item in entries {
        let entry =
            item.map_err(|error| ActionError::storage("list import directory", source, error))?;
        if entry.path().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

fn state_name_for(file: &Utf8Path) -> Result<String, ActionError> {
    let file_name = file.file_name().unwrap_or_default();
    let name = file_name
        .strip_suffix(STATE_SUFFIX)
        .or_else(|| file.file_stem())
        .unwrap_or_default();
    validate_state_name("file-path", name)?;
    Ok(name.to_owned())
}

#[cfg(test)]
mod tests;
