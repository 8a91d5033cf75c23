//! Runtime for the `xmnr` binary.
//!
//! One invocation runs one operation: the binary loads configuration,
//! checks the installation root, installs telemetry, dispatches the
//! operation and prints the JSON response on stdout. SIGINT and SIGTERM
//! abort the running operation instead of killing the process, so the test
//! driver is always stopped and reaped before the binary exits.
//!
//! Exit codes: `0` when the response carries `success`, `1` for any other
//! response, `2` when the binary could not start.

use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::error::ErrorKind;
use thiserror::Error;
use tracing::{info, warn};
use xmnr_actions::{ActionContext, ActionResponse, Dispatcher, Params, SessionKey};
use xmnr_config::{Config, InstallDirError};

mod cli;
mod config;
mod signals;
pub mod telemetry;


use cli::Cli;
use config::{ConfigLoader, OrthoConfigLoader};
use signals::AbortOnSignal;
use telemetry::TelemetryError;

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::run");

/// Exit code reported when the binary could not start an operation.
const STARTUP_FAILURE: u8 = 2;

/// Errors that stop the binary before or after an operation runs.
#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("parameter '{argument}' must be written as TAG=VALUE")]
    MalformedParameter { argument: String },
    #[error(transparent)]
    InstallDir(#[from] InstallDirError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error("failed to install signal handlers: {0}")]
    Signals(io::Error),
    #[error("failed to serialise response: {0}")]
    SerialiseResponse(serde_json::Error),
    #[error("failed to write response: {0}")]
    WriteResponse(io::Error),
}

/// Runs the binary with the given arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let arguments: Vec<OsString> = args.into_iter().collect();
    let cli = match Cli::try_parse_from(&arguments) {
        Ok(cli) => cli,
        Err(error) if is_informational(&error) => {
            return match write!(stdout, "{error}") {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }
        Err(error) => {
            report(stderr, &AppError::CliUsage(error));
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let program = arguments.first().cloned().unwrap_or_else(|| OsString::from("xmnr"));
    let prepared = loader
        .load(&program, cli.config_path.as_deref())
        .and_then(|config| prepare(&cli, &config).map(|params| (config, params)));
    let (config, params) = match prepared {
        Ok(prepared) => prepared,
        Err(error) => {
            report(stderr, &error);
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    let session = SessionKey::new(cli.usid, cli.thandle);
    let dispatcher = Arc::new(Dispatcher::standard(ActionContext::from_config(&config)));
    let watcher = match AbortOnSignal::install(Arc::clone(&dispatcher), session) {
        Ok(watcher) => watcher,
        Err(error) => {
            report(stderr, &AppError::Signals(error));
            return ExitCode::from(STARTUP_FAILURE);
        }
    };

    info!(
        target: CLI_TARGET,
        operation = %cli.operation,
        device = %cli.device,
        %session,
        "dispatching operation"
    );
    let response = dispatcher.invoke(session, &cli.operation, &cli.device, params);
    drop(watcher);

    match emit_response(stdout, &response) {
        Ok(()) if response.is_success() => ExitCode::SUCCESS,
        Ok(()) => ExitCode::FAILURE,
        Err(error) => {
            report(stderr, &error);
            ExitCode::FAILURE
        }
    }
}

/// Validates the environment and collects parameters ahead of dispatch.
fn prepare(cli: &Cli, config: &Config) -> Result<Params, AppError> {
    config.validate_install_dir()?;
    telemetry::initialise(config)?;
    cli.params()
}

fn emit_response<W: Write>(stdout: &mut W, response: &ActionResponse) -> Result<(), AppError> {
    serde_json::to_writer(&mut *stdout, response).map_err(AppError::SerialiseResponse)?;
    writeln!(stdout).map_err(AppError::WriteResponse)?;
    stdout.flush().map_err(AppError::WriteResponse)
}

fn is_informational(error: &clap::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
    )
}

fn report<E: Write>(stderr: &mut E, error: &AppError) {
    if let Err(write_error) = writeln!(stderr, "xmnr: {error}") {
        warn!(
            target: CLI_TARGET,
            %error,
            %write_error,
            "failed to report error"
        );
    }
}
