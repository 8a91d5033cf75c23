//! Handlers that work directly on the state store.

use std::sync::Arc;

use camino::Utf8Path;
use tracing::{debug, info};

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handler::{ActionHandler, HandlerLifecycle, HandlerState};
use crate::params::{Params, ResolvedParams};
use crate::registry::{HandlerRequest, OperationKind};
use crate::response::ActionResponse;
use crate::states::StateStore;

/// Tracing target for state store operations.
const LOCAL_OP_TARGET: &str = "xmnr_actions::operations::local";

/// Handler for operations served from the state store.
#[derive(Debug)]
pub struct LocalOperation {
    kind: OperationKind,
    device: String,
    params: Params,
    context: Arc<ActionContext>,
    lifecycle: HandlerLifecycle,
}

impl LocalOperation {
    /// Creates a handler for `kind`.
    #[must_use]
    pub fn new(kind: OperationKind, request: HandlerRequest) -> Self {
        Self {
            kind,
            device: request.device,
            params: request.params,
            context: request.context,
            lifecycle: HandlerLifecycle::new(),
        }
    }

    fn execute(&self) -> Result<ActionResponse, ActionError> {
        let params = self.params.resolve(self.kind.params())?;
        if self.context.devices().lookup(&self.device)?.is_none() {
            return Err(ActionError::DeviceNotFound {
                device: self.device.clone(),
            });
        }
        let store = StateStore::new(
            self.context.settings().device_paths(&self.device),
            self.device.as_str(),
        );
        let text = self.apply(&store, &params)?;
        info!(
            target: LOCAL_OP_TARGET,
            operation = self.kind.name(),
            device = %self.device,
            "state store operation completed"
        );
        Ok(ActionResponse::success(text))
    }

    fn apply(&self, store: &StateStore, params: &ResolvedParams) -> Result<String, ActionError> {
        match self.kind {
            OperationKind::ListStates => store.render_listing(),
            OperationKind::ViewState => store.view(params.require("state-name")?),
            OperationKind::DeleteState => {
                let name = params.require("state-name")?;
                store.delete(name)?;
                Ok(format!("State {name} deleted"))
            }
            OperationKind::DisableState => {
                let name = params.require("state-name")?;
                Ok(if store.disable(name)? {
                    format!("State {name} disabled")
                } else {
                    format!("State {name} is already disabled")
                })
            }
            OperationKind::EnableState => {
                let name = params.require("state-name")?;
                Ok(if store.enable(name)? {
                    format!("State {name} enabled")
                } else {
                    format!("State {name} is already enabled")
                })
            }
            OperationKind::ImportStateFiles => {
                let source = Utf8Path::new(params.require("file-path")?);
                let imported = store.import(source, params.flag("overwrite"))?;
                Ok(if imported.is_empty() {
                    "No state files imported".to_owned()
                } else {
                    format!("Imported states: {}", imported.join(", "))
                })
            }
            other => Err(ActionError::internal(format!(
                "operation '{other}' is not served from the state store"
            ))),
        }
    }
}

impl ActionHandler for LocalOperation {
    fn perform_action(&self) -> Result<ActionResponse, ActionError> {
        debug!(
            target: LOCAL_OP_TARGET,
            operation = self.kind.name(),
            device = %self.device,
            "starting state store operation"
        );
        self.lifecycle.run(|| self.execute())
    }

    fn abort_action(&self) {
        self.lifecycle.request_abort();
    }

    fn state(&self) -> HandlerState {
        self.lifecycle.state()
    }
}
