//! Handlers that delegate their work to the external test driver.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use tracing::{debug, info, warn};
use xmnr_driver::{
    DriverError, DriverEvent, DriverProcess, DriverRequest, ExitOutcome, LaunchSpec, Received,
};

use crate::context::ActionContext;
use crate::devices::resolve_testable;
use crate::errors::ActionError;
use crate::handler::{ActionHandler, HandlerLifecycle, HandlerState};
use crate::params::Params;
use crate::registry::{HandlerRequest, OperationKind};
use crate::response::ActionResponse;

/// Tracing target for driver-backed operations.
const DRIVER_OP_TARGET: &str = "xmnr_actions::operations::driver";

/// Success text when the driver reports nothing to summarise.
const COMPLETED: &str = "Operation completed";

/// Handler that runs one operation through the test driver.
#[derive(Debug)]
pub struct DriverOperation {
    kind: OperationKind,
    device: String,
    params: Params,
    context: Arc<ActionContext>,
    lifecycle: HandlerLifecycle,
}

impl DriverOperation {
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
        let resolved = self.params.resolve(self.kind.params())?;
        let device = resolve_testable(self.context.devices(), &self.device)?;
        let settings = self.context.settings();
        let paths = settings.device_paths(&device.name);
        paths.prepare()?;

        let spec = LaunchSpec::new(settings.driver_command(), paths.test_dir())
            .with_args(settings.driver_args().iter().cloned())
            .with_args([self.kind.name(), device.name.as_str()])
            .with_poll_interval(settings.poll_interval())
            .with_max_message_bytes(settings.max_message_bytes());
        let request = resolved.values().iter().fold(
            DriverRequest::new(self.kind.name(), device.name.as_str()),
            |request, (tag, value)| request.with_argument(tag, value),
        );

        self.lifecycle.checkpoint()?;
        let mut process = DriverProcess::spawn(&spec)?;
        let outcome = self.supervise(&mut process, &request);
        if outcome.is_err() {
            if let Err(error) = process.terminate(settings.terminate_grace()) {
                warn!(
                    target: DRIVER_OP_TARGET,
                    operation = self.kind.name(),
                    %error,
                    "failed to stop test driver after error"
                );
            }
        }
        outcome
    }

    fn supervise(
        &self,
        process: &mut DriverProcess,
        request: &DriverRequest,
    ) -> Result<ActionResponse, ActionError> {
        match process.send(request) {
            Ok(()) => {}
            Err(error) if is_disconnect(&error) => {
                debug!(
                    target: DRIVER_OP_TARGET,
                    operation = self.kind.name(),
                    %error,
                    "test driver closed its input before the request was sent"
                );
            }
            Err(error) => return Err(error.into()),
        }

        let mut report = RunReport::default();
        loop {
            if self.lifecycle.abort_requested() {
                return self.abandon(process);
            }
            match process.receive::<DriverEvent>() {
                Ok(Received::Message(event)) => report.record(self.kind, &self.device, event),
                Ok(Received::Idle) => {}
                Ok(Received::Closed) => break,
                Err(error) if error.is_protocol_violation() => {
                    warn!(
                        target: DRIVER_OP_TARGET,
                        operation = self.kind.name(),
                        device = %self.device,
                        %error,
                        "test driver produced malformed output"
                    );
                    return Err(ActionError::child_failure(format!(
                        "test driver produced malformed output: {error}"
                    )));
                }
                Err(error) => return Err(error.into()),
            }
        }

        match process.wait(self.lifecycle.abort_flag())? {
            ExitOutcome::Aborted => self.abandon(process),
            ExitOutcome::Exited(status) => {
                let stderr = process.stderr_output()?;
                report.conclude(status, &stderr)
            }
        }
    }

    fn abandon(&self, process: &mut DriverProcess) -> Result<ActionResponse, ActionError> {
        let discarded = process.discard_pending();
        let status = process.terminate(self.context.settings().terminate_grace())?;
        info!(
            target: DRIVER_OP_TARGET,
            operation = self.kind.name(),
            device = %self.device,
            pid = process.id(),
            ?status,
            discarded,
            "operation aborted, test driver stopped"
        );
        Err(ActionError::Aborted)
    }
}

impl ActionHandler for DriverOperation {
    fn perform_action(&self) -> Result<ActionResponse, ActionError> {
        info!(
            target: DRIVER_OP_TARGET,
            operation = self.kind.name(),
            device = %self.device,
            "starting driver operation"
        );
        self.lifecycle.run(|| self.execute())
    }

    fn abort_action(&self) {
        debug!(
            target: DRIVER_OP_TARGET,
            operation = self.kind.name(),
            device = %self.device,
            "abort requested"
        );
        self.lifecycle.request_abort();
    }

    fn state(&self) -> HandlerState {
        self.lifecycle.state()
    }
}

fn is_disconnect(error: &DriverError) -> bool {
    matches!(
        error,
        DriverError::Io { source, .. }
            if matches!(source.kind(), io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset)
    )
}

/// Everything the driver reported during one run.
#[derive(Debug, Default)]
struct RunReport {
    errors: Vec<String>,
    summary: Option<String>,
    passed: usize,
    failed: Vec<String>,
}

impl RunReport {
    fn record(&mut self, kind: OperationKind, device: &str, event: DriverEvent) {
        match event {
            DriverEvent::Output { data } => {
                debug!(target: DRIVER_OP_TARGET, operation = kind.name(), device, %data, "driver output");
            }
            DriverEvent::Progress { message } => {
                info!(target: DRIVER_OP_TARGET, operation = kind.name(), device, %message, "driver progress");
            }
            DriverEvent::State { name, passed } => {
                info!(target: DRIVER_OP_TARGET, operation = kind.name(), device, state = %name, passed, "state visited");
                if passed {
                    self.passed += 1;
                } else {
                    self.failed.push(name);
                }
            }
            DriverEvent::Error { message } => {
                warn!(target: DRIVER_OP_TARGET, operation = kind.name(), device, %message, "driver reported an error");
                self.errors.push(message);
            }
            DriverEvent::Summary { text } => self.summary = Some(text),
        }
    }

    fn conclude(mut self, status: ExitStatus, stderr: &str) -> Result<ActionResponse, ActionError> {
        if status.success() && self.errors.is_empty() {
            let text = self
                .summary
                .take()
                .unwrap_or_else(|| self.generated_summary());
            return Ok(ActionResponse::success(text));
        }

        let mut detail = self.errors.join("\n");
        let diagnostics = stderr.trim();
        if !diagnostics.is_empty() {
            if !detail.is_empty() {
                detail.push('\n');
            }
            detail.push_str(diagnostics);
        }
        if detail.is_empty() {
            detail = format!("test driver failed ({status})");
        }
        Err(ActionError::child_failure(detail))
    }

    fn generated_summary(&self) -> String {
        if self.passed == 0 && self.failed.is_empty() {
            return COMPLETED.to_owned();
        }
        let mut text = format!("{} states passed", self.passed);
        if !self.failed.is_empty() {
            text.push_str(&format!(
                ", {} failed: {}",
                self.failed.len(),
                self.failed.join(", ")
            ));
        }
        text
    }
}
