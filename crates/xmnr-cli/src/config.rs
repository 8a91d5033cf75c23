//! Configuration loading for the `xmnr` binary.

use std::ffi::OsString;
use std::path::Path;

use ortho_config::OrthoConfig;
use xmnr_config::Config;

use crate::AppError;

/// Source of the resolved configuration.
pub(crate) trait ConfigLoader {
    /// Loads configuration, honouring an explicit configuration file.
    fn load(&self, program: &OsString, config_path: Option<&Path>) -> Result<Config, AppError>;
}

/// Loads configuration through `ortho_config` layering.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, program: &OsString, config_path: Option<&Path>) -> Result<Config, AppError> {
        Config::load_from_iter(config_arguments(program, config_path))
            .map_err(AppError::LoadConfiguration)
    }
}

/// Builds the argument vector handed to the configuration loader.
///
/// Operation arguments never reach `ortho_config`; only the program name and
/// the configuration file flag do.
pub(crate) fn config_arguments(program: &OsString, config_path: Option<&Path>) -> Vec<OsString> {
    let mut arguments = vec![program.clone()];
    if let Some(path) = config_path {
        arguments.push(OsString::from("--config-path"));
        arguments.push(path.as_os_str().to_owned());
    }
    arguments
}

/// Loader that hands out a fixed configuration.
#[cfg(test)]
pub(crate) struct StaticConfigLoader(pub(crate) Config);

#[cfg(test)]
impl ConfigLoader for StaticConfigLoader {
    fn load(&self, _program: &OsString, _config_path: Option<&Path>) -> Result<Config, AppError> {
        Ok(self.0.clone())
    }
}
