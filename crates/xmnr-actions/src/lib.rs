//! Operation dispatch and cancellation for the xmnr configuration test
//! harness.
//!
//! An embedding host hands the [`Dispatcher`] a named operation, a device
//! and a parameter bag, and receives one [`ActionResponse`] back. While the
//! operation runs, another thread may call [`Dispatcher::abort`] for the
//! same [`SessionKey`]; the running handler notices at its next suspension
//! point, stops its test driver and reports `Operation aborted`.
//!
//! # Architecture
//!
//! - [`registry`] maps operation names to handler factories. The standard
//!   catalogue is described by [`OperationKind`].
//! - [`operations`] holds the handlers. Driver-backed operations run the
//!   external test driver through `xmnr-driver`; state store operations
//!   work on [`states::StateStore`] directly.
//! - [`dispatcher`] tracks the running handler per session and flattens
//!   every failure into a response.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use xmnr_actions::{
//!     ActionContext, DeviceKind, Dispatcher, Params, RunSettings, SessionKey, StaticDevices,
//! };
//!
//! let settings = RunSettings::new("/var/lib/xmnr", "/usr/libexec/xmnr-driver");
//! let devices = StaticDevices::new().with_device("ios0", DeviceKind::Cli);
//! let dispatcher = Dispatcher::standard(ActionContext::new(settings, Arc::new(devices)));
//!
//! let response = dispatcher.invoke(
//!     SessionKey::new(1, 1),
//!     "walk-states",
//!     "ios0",
//!     Params::new().with("rollback", "true"),
//! );
//! println!("{}", serde_json::to_string(&response).unwrap());
//! ```

pub mod context;
pub mod devices;
pub mod dispatcher;
pub mod errors;
pub mod handler;
pub mod operations;
pub mod params;
pub mod registry;
pub mod response;
pub mod states;

#[cfg(test)]
mod tests;

pub use self::context::{ActionContext, RunSettings};
pub use self::devices::{
    DeviceDirectory, DeviceInfo, DeviceKind, FileDeviceDirectory, StaticDevices,
};
pub use self::dispatcher::{Dispatcher, SessionKey};
pub use self::errors::ActionError;
pub use self::handler::{ActionHandler, HandlerLifecycle, HandlerState};
pub use self::params::{ParamKind, ParamSpec, Params, ResolvedParams};
pub use self::registry::{HandlerFactory, HandlerRequest, OperationKind, OperationRegistry};
pub use self::response::{ActionResponse, ErrorDetail};
pub use self::states::{StateEntry, StateStore, StatesProvider, StoreStatesProvider};
