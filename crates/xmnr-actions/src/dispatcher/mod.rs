//! Operation dispatch and per-session abort routing.
//!
//! [`Dispatcher::invoke`] looks up a factory, builds a handler, records it
//! as the session's running handler and runs it on the calling thread.
//! [`Dispatcher::abort`] may be called from any other thread; it finds the
//! session's running handler, if any, and asks it to stop.
//!
//! This is the single boundary where failures are flattened into an
//! [`ActionResponse`]. Structured errors keep their text. Opaque errors and
//! panics become `failure: "Operation failed"` and are logged in full.

use std::any::Any;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::context::ActionContext;
use crate::errors::{ActionError, OPAQUE_FAILURE};
use crate::handler::ActionHandler;
use crate::params::Params;
use crate::registry::{HandlerRequest, OperationRegistry};
use crate::response::ActionResponse;

/// Tracing target for dispatch decisions.
const DISPATCH_TARGET: &str = "xmnr_actions::dispatch";

/// Identifies the caller whose operation is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    /// User session identifier.
    pub usid: u32,
    /// Transaction handle within the session.
    pub thandle: i32,
}

impl SessionKey {
    /// Creates a session key.
    #[must_use]
    pub const fn new(usid: u32, thandle: i32) -> Self {
        Self { usid, thandle }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.usid, self.thandle)
    }
}

type RunningHandlers = HashMap<SessionKey, Arc<dyn ActionHandler>>;

/// Routes operations to handlers and aborts to running handlers.
pub struct Dispatcher {
    registry: OperationRegistry,
    context: Arc<ActionContext>,
    running: Mutex<RunningHandlers>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: OperationRegistry, context: ActionContext) -> Self {
        Self {
            registry,
            context: Arc::new(context),
            running: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a dispatcher serving the standard operations.
    #[must_use]
    pub fn standard(context: ActionContext) -> Self {
        Self::new(OperationRegistry::standard(), context)
    }

    /// Runs `operation` on `device` for `session` and returns its result.
    ///
    /// Never panics and never returns a response with other than exactly one
    /// key set. The session's running-handler slot is empty again when this
    /// returns.
    pub fn invoke(
        &self,
        session: SessionKey,
        operation: &str,
        device: &str,
        params: Params,
    ) -> ActionResponse {
        debug!(
            target: DISPATCH_TARGET,
            %session,
            operation,
            device,
            "dispatching operation"
        );
        match self.run(session, operation, device, params) {
            Ok(response) if response.populated_keys() == 1 => {
                info!(target: DISPATCH_TARGET, %session, operation, device, "operation succeeded");
                response
            }
            Ok(response) => {
                error!(
                    target: DISPATCH_TARGET,
                    %session,
                    operation,
                    ?response,
                    "handler returned a response without exactly one key"
                );
                ActionResponse::failure(OPAQUE_FAILURE)
            }
            Err(failure) => {
                log_failure(session, operation, device, &failure);
                failure.to_response()
            }
        }
    }

    /// Asks the session's running handler, if any, to stop.
    ///
    /// Returns without waiting for the handler to finish.
    pub fn abort(&self, session: SessionKey) {
        let handler = self.lock_running().get(&session).cloned();
        match handler {
            Some(running) => {
                info!(target: DISPATCH_TARGET, %session, "aborting running operation");
                running.abort_action();
            }
            None => {
                debug!(target: DISPATCH_TARGET, %session, "abort ignored, nothing running");
            }
        }
    }

    /// Returns `true` while an operation runs for `session`.
    #[must_use]
    pub fn is_running(&self, session: SessionKey) -> bool {
        self.lock_running().contains_key(&session)
    }

    fn run(
        &self,
        session: SessionKey,
        operation: &str,
        device: &str,
        params: Params,
    ) -> Result<ActionResponse, ActionError> {
        let factory = self
            .registry
            .lookup(operation)
            .ok_or_else(|| ActionError::UnsupportedOperation {
                operation: operation.to_owned(),
            })?;
        let request = HandlerRequest {
            operation: operation.to_owned(),
            device: device.to_owned(),
            params,
            context: Arc::clone(&self.context),
        };
        let handler = guarded("building handler", || factory(request))?;
        let _slot = self.occupy(session, Arc::clone(&handler))?;
        guarded("running handler", || handler.perform_action())?
    }

    fn occupy(
        &self,
        session: SessionKey,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<SlotGuard<'_>, ActionError> {
        let mut running = self.lock_running();
        if running.contains_key(&session) {
            return Err(ActionError::SessionBusy {
                usid: session.usid,
                thandle: session.thandle,
            });
        }
        running.insert(session, handler);
        Ok(SlotGuard {
            running: &self.running,
            session,
        })
    }

    fn lock_running(&self) -> MutexGuard<'_, RunningHandlers> {
        self.running
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running: Vec<SessionKey> = self.lock_running().keys().copied().collect();
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("context", &self.context)
            .field("running", &running)
            .finish()
    }
}

/// Clears a session's running-handler slot when dropped.
struct SlotGuard<'a> {
    running: &'a Mutex<RunningHandlers>,
    session: SessionKey,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .remove(&self.session);
        debug!(target: DISPATCH_TARGET, session = %self.session, "session slot cleared");
    }
}

/// Runs `body`, turning a panic into [`ActionError::Internal`].
fn guarded<T>(stage: &str, body: impl FnOnce() -> T) -> Result<T, ActionError> {
    panic::catch_unwind(AssertUnwindSafe(body)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        ActionError::internal(format!("panic while {stage}: {message}"))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

fn log_failure(session: SessionKey, operation: &str, device: &str, failure: &ActionError) {
    match failure {
        ActionError::Aborted => {
            info!(target: DISPATCH_TARGET, %session, operation, device, "operation aborted");
        }
        opaque if opaque.is_opaque() => {
            error!(
                target: DISPATCH_TARGET,
                %session,
                operation,
                device,
                error = %error_chain(opaque),
                "operation failed"
            );
        }
        structured => {
            warn!(
                target: DISPATCH_TARGET,
                %session,
                operation,
                device,
                error = %structured,
                "operation did not succeed"
            );
        }
    }
}

/// Renders an error and every source below it.
fn error_chain(top: &dyn StdError) -> String {
    let mut rendered = top.to_string();
    let mut current = top.source();
    while let Some(cause) = current {
        rendered.push_str(": caused by: ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}
