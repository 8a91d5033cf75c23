//! Command-line argument definitions for the `xmnr` binary.

use std::path::PathBuf;

use clap::Parser;
use xmnr_actions::Params;

use crate::AppError;

/// Runs one XMNR operation against a device and prints the JSON response.
#[derive(Parser, Debug)]
#[command(name = "xmnr", version, disable_help_subcommand = true)]
pub(crate) struct Cli {
    /// Configuration file layered over the built-in defaults.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_path: Option<PathBuf>,
    /// User session the operation runs under.
    #[arg(long, default_value_t = 0)]
    pub(crate) usid: u32,
    /// Transaction handle the operation runs under.
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub(crate) thandle: i32,
    /// Operation name (for example `walk-states`).
    #[arg(value_name = "OPERATION")]
    pub(crate) operation: String,
    /// Device the operation targets.
    #[arg(value_name = "DEVICE")]
    pub(crate) device: String,
    /// Operation parameters written as `tag=value`.
    #[arg(value_name = "TAG=VALUE", num_args = 0..)]
    pub(crate) parameters: Vec<String>,
}

impl Cli {
    /// Collects the `tag=value` arguments into a parameter bag.
    pub(crate) fn params(&self) -> Result<Params, AppError> {
        self.parameters
            .iter()
            .map(|argument| {
                argument
                    .split_once('=')
                    .filter(|(tag, _)| !tag.is_empty())
                    .map(|(tag, value)| (tag.to_owned(), value.to_owned()))
                    .ok_or_else(|| AppError::MalformedParameter {
                        argument: argument.clone(),
                    })
            })
            .collect()
    }
}
