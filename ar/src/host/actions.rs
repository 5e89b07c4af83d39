//! UI action abstraction
//!
//! The retry machinery never touches the host UI directly. It asks an
//! [`ActionSource`] to perform a [`UiAction`]; how that maps onto buttons is
//! the implementation's business. [`AffordanceActionSource`] is the usual
//! implementation: a prioritized list of equivalent controls per action,
//! resolved against an [`AffordanceSurface`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::HostError;

/// Corrective actions the host UI offers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiAction {
    /// Discard the last assistant turn and generate it again
    Regenerate,
    /// Show the previous alternate response
    SwipePrevious,
    /// Show (or generate) the next alternate response, second half of a swipe cycle
    SwipeNext,
    /// Move on to a new alternate response as a retry of its own
    SwipeAdvance,
}

impl UiAction {
    /// Controls that perform this action in the stock chat UI, highest priority first
    pub fn default_affordances(&self) -> &'static [&'static str] {
        match self {
            UiAction::Regenerate => &[
                "#option_regenerate",
                ".regenerate_button",
                "[title=\"Regenerate\"]",
                ".fa-redo",
                ".fa-refresh",
            ],
            UiAction::SwipePrevious => &["#swipe_left", ".swipe_left", "[title=\"Previous reply\"]", ".fa-chevron-left"],
            UiAction::SwipeNext => &[
                "#swipe_right",
                ".swipe_right",
                ".mes_buttons .swipe_right",
                ".last_mes .swipe_right",
                "[title=\"Next reply\"]",
                ".fa-chevron-right",
            ],
            UiAction::SwipeAdvance => &[
                ".swipe_right",
                ".mes_buttons .swipe_right",
                "#chat .swipe_right",
                ".last_mes .swipe_right",
                "[title=\"Swipe right\"]",
                ".fa-chevron-right.interactable",
            ],
        }
    }

    /// Whether the primary control may be clicked even when it does not report enabled
    ///
    /// A disabled swipe button never starts a generation, so a forced advance would
    /// leave the retry waiting for a generation-ended that does not come.
    pub fn forces_primary(&self) -> bool {
        !matches!(self, UiAction::SwipeAdvance)
    }
}

/// Something that can carry out UI actions on the host
#[async_trait]
pub trait ActionSource: Send + Sync {
    /// Perform the action; true when some control was activated
    async fn try_invoke(&self, action: UiAction) -> bool;

    /// Show an informational notice to the user
    fn notify(&self, message: &str) {
        info!(%message, "ActionSource::notify");
    }
}

/// Visibility and availability of a single control
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AffordanceState {
    Enabled,
    Disabled,
    Hidden,
    Missing,
}

/// A discoverable set of named, clickable controls
pub trait AffordanceSurface: Send + Sync {
    /// Current state of the named control
    fn state(&self, name: &str) -> AffordanceState;

    /// Click the named control
    fn activate(&self, name: &str) -> Result<(), HostError>;

    /// Show an informational notice to the user
    fn notify(&self, message: &str) {
        info!(%message, "AffordanceSurface::notify");
    }
}

/// [`ActionSource`] that resolves each action through a prioritized affordance list
pub struct AffordanceActionSource<S> {
    surface: S,
    table: HashMap<UiAction, Vec<String>>,
}

impl<S: AffordanceSurface> AffordanceActionSource<S> {
    /// Create a source using the stock affordance lists
    pub fn new(surface: S) -> Self {
        debug!("AffordanceActionSource::new: called");
        let table = [
            UiAction::Regenerate,
            UiAction::SwipePrevious,
            UiAction::SwipeNext,
            UiAction::SwipeAdvance,
        ]
            .into_iter()
            .map(|action| {
                let names = action.default_affordances().iter().map(|s| s.to_string()).collect();
                (action, names)
            })
            .collect();
        Self { surface, table }
    }

    /// Replace the affordance list for one action
    pub fn with_affordances(mut self, action: UiAction, names: Vec<String>) -> Self {
        debug!(?action, count = names.len(), "AffordanceActionSource::with_affordances: called");
        self.table.insert(action, names);
        self
    }

    /// Access the underlying surface
    pub fn surface(&self) -> &S {
        &self.surface
    }

    fn resolve(&self, action: UiAction) -> bool {
        let Some(names) = self.table.get(&action) else {
            warn!(?action, "No affordances registered for action");
            return false;
        };

        for name in names {
            match self.surface.state(name) {
                AffordanceState::Enabled => match self.surface.activate(name) {
                    Ok(()) => {
                        info!(?action, affordance = %name, "Activated affordance");
                        return true;
                    }
                    Err(e) => {
                        warn!(?action, affordance = %name, error = %e, "Affordance activation failed");
                    }
                },
                state => {
                    debug!(?action, affordance = %name, ?state, "AffordanceActionSource::resolve: skipping");
                }
            }
        }

        if !action.forces_primary() {
            warn!(?action, "No enabled affordance found");
            return false;
        }

        // Nothing usable: force the primary control if it exists at all
        let Some(primary) = names.first() else {
            return false;
        };
        if self.surface.state(primary) == AffordanceState::Missing {
            warn!(?action, "No usable affordance found");
            return false;
        }
        match self.surface.activate(primary) {
            Ok(()) => {
                info!(?action, affordance = %primary, "Force-activated primary affordance");
                true
            }
            Err(e) => {
                warn!(?action, affordance = %primary, error = %e, "Forced activation failed");
                false
            }
        }
    }
}

#[async_trait]
impl<S: AffordanceSurface> ActionSource for AffordanceActionSource<S> {
    async fn try_invoke(&self, action: UiAction) -> bool {
        debug!(?action, "AffordanceActionSource::try_invoke: called");
        self.resolve(action)
    }

    fn notify(&self, message: &str) {
        self.surface.notify(message);
    }
}
