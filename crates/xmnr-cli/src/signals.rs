//! Turns SIGINT and SIGTERM into an abort of the running operation.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use tracing::{info, warn};
use xmnr_actions::{Dispatcher, SessionKey};

const SIGNALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::signals");

/// Background thread that aborts one session whenever a termination signal
/// arrives. Dropping the watcher unregisters the handlers and joins the
/// thread.
pub(crate) struct AbortOnSignal {
    handle: Handle,
    worker: Option<JoinHandle<()>>,
}

impl AbortOnSignal {
    /// Registers the handlers and starts the watcher thread.
    pub(crate) fn install(dispatcher: Arc<Dispatcher>, session: SessionKey) -> io::Result<Self> {
        let mut signals = Signals::new([SIGINT, SIGTERM])?;
        let handle = signals.handle();
        let worker = thread::Builder::new()
            .name("xmnr-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    info!(
                        target: SIGNALS_TARGET,
                        signal,
                        %session,
                        "termination signal received, aborting operation"
                    );
                    dispatcher.abort(session);
                }
            })?;
        Ok(Self {
            handle,
            worker: Some(worker),
        })
    }
}

impl Drop for AbortOnSignal {
    fn drop(&mut self) {
        self.handle.close();
        let Some(worker) = self.worker.take() else {
            return;
        };
        if worker.join().is_err() {
            warn!(target: SIGNALS_TARGET, "signal watcher thread panicked");
        }
    }
}
