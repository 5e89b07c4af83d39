//! Lifecycle event types published by the chat host

use serde::{Deserialize, Serialize};

/// Generation lifecycle events the host publishes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    /// A generation has started; `trigger` is the host's generation type ("swipe", "regenerate", ...)
    GenerationStarted {
        #[serde(default)]
        trigger: Option<String>,
    },
    /// A generation has finished (successfully or not)
    GenerationEnded,
    /// The user aborted the generation
    GenerationStopped,
    /// The active conversation was switched or reloaded
    ChatChanged,
}

impl LifecycleEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::GenerationStarted { .. } => "GenerationStarted",
            LifecycleEvent::GenerationEnded => "GenerationEnded",
            LifecycleEvent::GenerationStopped => "GenerationStopped",
            LifecycleEvent::ChatChanged => "ChatChanged",
        }
    }
}

/// How the host initiated a generation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationKind {
    /// Anything that is not a swipe: send, regenerate, continue, impersonate
    Normal,
    Swipe,
}

impl GenerationKind {
    /// Interpret the trigger payload of a generation-started event
    ///
    /// Only a swipe changes how a session is tracked; every other payload,
    /// including a missing one, is a normal generation.
    pub fn from_trigger(trigger: Option<&str>) -> Self {
        match trigger.map(str::trim) {
            Some("swipe") => GenerationKind::Swipe,
            _ => GenerationKind::Normal,
        }
    }
}
