//! Operation handler contract and lifecycle bookkeeping.
//!
//! A handler is created per invocation, run once on the invoking thread,
//! and may be asked to abort from any other thread while it runs. Abort is
//! cooperative: [`ActionHandler::abort_action`] only sets a flag that the
//! running handler observes at its next suspension point.

use std::fmt;
use std::sync::Mutex;

use tracing::debug;
use xmnr_driver::AbortFlag;

use crate::errors::ActionError;
use crate::response::ActionResponse;

/// Tracing target for handler lifecycle transitions.
const HANDLER_TARGET: &str = "xmnr_actions::handler";

/// Lifecycle of a handler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Constructed, not yet run.
    Created,
    /// Running.
    Started,
    /// Finished with a success response.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped by an abort request.
    Aborted,
}

impl HandlerState {
    /// Returns `true` for the three terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

impl fmt::Display for HandlerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// A runnable, abortable operation.
pub trait ActionHandler: Send + Sync {
    /// Runs the operation to completion on the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an [`ActionError`] describing why the operation did not
    /// succeed, including [`ActionError::Aborted`] after an abort request.
    fn perform_action(&self) -> Result<ActionResponse, ActionError>;

    /// Requests cancellation. Never blocks; a no-op once the handler has
    /// finished.
    fn abort_action(&self);

    /// Current lifecycle state.
    fn state(&self) -> HandlerState;
}

/// Shared lifecycle state for handler implementations.
///
/// Tracks [`HandlerState`] transitions and owns the [`AbortFlag`] that the
/// run loop polls.
#[derive(Debug)]
pub struct HandlerLifecycle {
    state: Mutex<HandlerState>,
    abort: AbortFlag,
}

impl Default for HandlerLifecycle {
    fn default() -> Self {
        Self {
            state: Mutex::new(HandlerState::Created),
            abort: AbortFlag::new(),
        }
    }
}

impl HandlerLifecycle {
    /// Creates a lifecycle in the `Created` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandlerState {
        *self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Abort flag polled by the run loop.
    #[must_use]
    pub const fn abort_flag(&self) -> &AbortFlag {
        &self.abort
    }

    /// Returns `true` once an abort was requested.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        self.abort.is_requested()
    }

    /// Fails with [`ActionError::Aborted`] if an abort was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Aborted`] when the flag is set.
    pub fn checkpoint(&self) -> Result<(), ActionError> {
        if self.abort_requested() {
            return Err(ActionError::Aborted);
        }
        Ok(())
    }

    /// Moves `Created` to `Started`.
    ///
    /// # Errors
    ///
    /// Returns [`ActionError::Internal`] if the handler already ran.
    pub fn start(&self) -> Result<(), ActionError> {
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        if *state != HandlerState::Created {
            return Err(ActionError::internal(format!(
                "handler cannot start from state {}",
                *state
            )));
        }
        *state = HandlerState::Started;
        debug!(target: HANDLER_TARGET, "handler started");
        Ok(())
    }

    /// Records the terminal state matching `outcome` and passes it through.
    ///
    /// # Errors
    ///
    /// Returns `outcome`'s error unchanged.
    pub fn finish(
        &self,
        outcome: Result<ActionResponse, ActionError>,
    ) -> Result<ActionResponse, ActionError> {
        let terminal = match &outcome {
            Ok(_) => HandlerState::Succeeded,
            Err(ActionError::Aborted) => HandlerState::Aborted,
            Err(_) => HandlerState::Failed,
        };
        let mut state = self.state.lock().unwrap_or_else(|poison| poison.into_inner());
        *state = terminal;
        debug!(target: HANDLER_TARGET, state = %terminal, "handler finished");
        outcome
    }

    /// Sets the abort flag unless the handler already finished.
    pub fn request_abort(&self) {
        if self.state().is_terminal() {
            debug!(target: HANDLER_TARGET, "ignoring abort for finished handler");
            return;
        }
        self.abort.request();
    }

    /// Runs `body` between [`start`](Self::start) and
    /// [`finish`](Self::finish).
    ///
    /// # Errors
    ///
    /// Returns whatever `body` returns, or an error from `start`.
    pub fn run<F>(&self, body: F) -> Result<ActionResponse, ActionError>
    where
        F: FnOnce() -> Result<ActionResponse, ActionError>,
    {
        self.start()?;
        let outcome = self.checkpoint().and_then(|()| body());
        self.finish(outcome)
    }
}
