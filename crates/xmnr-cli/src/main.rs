//! Entry point for the `xmnr` binary.
//!
//! All behaviour lives in [`xmnr_cli::run`] so tests can drive it with
//! in-memory streams.

use std::io;
use std::process::ExitCode;

fn main() -> ExitCode {
    // The streams stay unlocked: telemetry and the signal watcher write to
    // stderr from other threads while the operation runs.
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    xmnr_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
