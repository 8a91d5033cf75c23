//! Operation catalogue and the name-to-factory registry.
//!
//! The registry is assembled once, before the dispatcher accepts calls, and
//! is never mutated afterwards. Looking up a name that was not registered
//! yields `None`; the dispatcher turns that into a failure response.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::context::ActionContext;
use crate::handler::ActionHandler;
use crate::operations::{DriverOperation, LocalOperation};
use crate::params::{ParamKind, ParamSpec, Params};

/// Everything a factory receives to build one handler.
#[derive(Debug, Clone)]
pub struct HandlerRequest {
    /// Name the operation was invoked under. Lets one factory serve
    /// several registered names.
    pub operation: String,
    /// Target device.
    pub device: String,
    /// Parameters as delivered by the host.
    pub params: Params,
    /// Shared settings and collaborators.
    pub context: Arc<ActionContext>,
}

/// Builds a handler for one invocation.
pub type HandlerFactory = Arc<dyn Fn(HandlerRequest) -> Arc<dyn ActionHandler> + Send + Sync>;

/// The standard operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    /// Prepares the device's test environment.
    SetupXmnr,
    /// Records the device's current configuration as a state.
    RecordState,
    /// Converts CLI configuration files into states.
    ImportConvertCliFiles,
    /// Checks that every recorded state can be applied.
    CheckStates,
    /// Moves the device into one recorded state.
    TransitionToState,
    /// Tries transitions between pairs of states.
    ExploreTransitions,
    /// Visits states in sequence.
    WalkStates,
    /// Resets coverage data.
    Reset,
    /// Collects coverage data.
    Collect,
    /// Loads the device's default configuration.
    LoadDefaultConfig,
    /// Saves the device's current configuration as its default.
    SaveDefaultConfig,
    /// Lists recorded states.
    ListStates,
    /// Shows one state's contents.
    ViewState,
    /// Deletes a state.
    DeleteState,
    /// Hides a state from the driver.
    DisableState,
    /// Makes a hidden state visible again.
    EnableState,
    /// Copies state files into the store.
    ImportStateFiles,
}

const NO_PARAMS: &[ParamSpec] = &[];
const OVERWRITE: ParamSpec = ParamSpec::optional("overwrite", ParamKind::Bool, "false");
const STATE_NAME: ParamSpec = ParamSpec::required("state-name", ParamKind::StateName);
const STATES: ParamSpec = ParamSpec::optional("states", ParamKind::Text, "");
const ROLLBACK: ParamSpec = ParamSpec::optional("rollback", ParamKind::Bool, "false");

const SETUP_PARAMS: &[ParamSpec] = &[OVERWRITE];
const RECORD_PARAMS: &[ParamSpec] = &[
    STATE_NAME,
    ParamSpec::optional("including-rollbacks", ParamKind::UInt, "0"),
];
const CONVERT_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("file-path-pattern", ParamKind::Path),
    OVERWRITE,
];
const CHECK_PARAMS: &[ParamSpec] = &[ParamSpec::optional("validate", ParamKind::Bool, "false")];
const TRANSITION_PARAMS: &[ParamSpec] = &[STATE_NAME, ROLLBACK];
const EXPLORE_PARAMS: &[ParamSpec] = &[
    STATES,
    ParamSpec::optional("stop-after", ParamKind::Text, ""),
];
const WALK_PARAMS: &[ParamSpec] = &[STATES, ROLLBACK];
const STATE_PARAMS: &[ParamSpec] = &[STATE_NAME];
const IMPORT_PARAMS: &[ParamSpec] = &[ParamSpec::required("file-path", ParamKind::Path), OVERWRITE];

impl OperationKind {
    /// Every standard operation, in catalogue order.
    pub const ALL: [Self; 17] = [
        Self::SetupXmnr,
        Self::RecordState,
        Self::ImportConvertCliFiles,
        Self::CheckStates,
        Self::TransitionToState,
        Self::ExploreTransitions,
        Self::WalkStates,
        Self::Reset,
        Self::Collect,
        Self::LoadDefaultConfig,
        Self::SaveDefaultConfig,
        Self::ListStates,
        Self::ViewState,
        Self::DeleteState,
        Self::DisableState,
        Self::EnableState,
        Self::ImportStateFiles,
    ];

    /// Wire name of the operation.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SetupXmnr => "setup-xmnr",
            Self::RecordState => "record-state",
            Self::ImportConvertCliFiles => "import-convert-cli-files",
            Self::CheckStates => "check-states",
            Self::TransitionToState => "transition-to-state",
            Self::ExploreTransitions => "explore-transitions",
            Self::WalkStates => "walk-states",
            Self::Reset => "reset",
            Self::Collect => "collect",
            Self::LoadDefaultConfig => "load-default-config",
            Self::SaveDefaultConfig => "save-default-config",
            Self::ListStates => "list-states",
            Self::ViewState => "view-state",
            Self::DeleteState => "delete-state",
            Self::DisableState => "disable-state",
            Self::EnableState => "enable-state",
            Self::ImportStateFiles => "import-state-files",
        }
    }

    /// Finds the operation with wire name `name`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Returns `true` for operations delegated to the test driver.
    #[must_use]
    pub const fn uses_driver(self) -> bool {
        !matches!(
            self,
            Self::ListStates
                | Self::ViewState
                | Self::DeleteState
                | Self::DisableState
                | Self::EnableState
                | Self::ImportStateFiles
        )
    }

    /// Parameters the operation understands.
    #[must_use]
    pub const fn params(self) -> &'static [ParamSpec] {
        match self {
            Self::SetupXmnr => SETUP_PARAMS,
            Self::RecordState => RECORD_PARAMS,
            Self::ImportConvertCliFiles => CONVERT_PARAMS,
            Self::CheckStates => CHECK_PARAMS,
            Self::TransitionToState => TRANSITION_PARAMS,
            Self::ExploreTransitions => EXPLORE_PARAMS,
            Self::WalkStates => WALK_PARAMS,
            Self::Reset
            | Self::Collect
            | Self::LoadDefaultConfig
            | Self::SaveDefaultConfig
            | Self::ListStates => NO_PARAMS,
            Self::ViewState | Self::DeleteState | Self::DisableState | Self::EnableState => {
                STATE_PARAMS
            }
            Self::ImportStateFiles => IMPORT_PARAMS,
        }
    }

    /// Factory building the standard handler for this operation.
    #[must_use]
    pub fn factory(self) -> HandlerFactory {
        if self.uses_driver() {
            Arc::new(move |request: HandlerRequest| -> Arc<dyn ActionHandler> {
                Arc::new(DriverOperation::new(self, request))
            })
        } else {
            Arc::new(move |request: HandlerRequest| -> Arc<dyn ActionHandler> {
                Arc::new(LocalOperation::new(self, request))
            })
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable map from operation name to handler factory.
#[derive(Clone, Default)]
pub struct OperationRegistry {
    factories: BTreeMap<String, HandlerFactory>,
}

impl OperationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every [`OperationKind`].
    #[must_use]
    pub fn standard() -> Self {
        OperationKind::ALL
            .into_iter()
            .fold(Self::new(), |registry, kind| {
                registry.with(kind.name(), kind.factory())
            })
    }

    /// Adds or replaces the factory for `name`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, factory: HandlerFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Factory registered for `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&HandlerFactory> {
        self.factories.get(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
