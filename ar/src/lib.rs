//! AutoRetry - automatic retry of unsatisfactory chat responses
//!
//! Watches the chat host's generation lifecycle, checks each finished
//! response against user-configured quality conditions, and re-triggers
//! generation through the host's UI when a response falls short.
//!
//! # Core Concepts
//!
//! - **One Owner**: All retry state lives on a single machine task
//! - **Epochs**: Every session boundary invalidates timers scheduled before it
//! - **Bounded**: At most `max-retries` corrective actions per session
//! - **Host Agnostic**: The conversation and UI are reached through traits
//!
//! # Modules
//!
//! - [`config`] - Settings, timing and configuration loading
//! - [`events`] - Lifecycle events and the event bus
//! - [`host`] - Traits for the chat host's conversation and UI
//! - [`retry`] - Session state, evaluator, action trigger and state machine
//! - [`logging`] - Tracing subscriber setup

pub mod config;
pub mod events;
pub mod host;
pub mod logging;
pub mod retry;

pub use config::{Config, RetrySettings, SettingsSource, SharedSettings, TimingConfig};
pub use events::{EventBus, GenerationKind, LifecycleEvent, create_event_bus};
pub use host::{
    ActionSource, AffordanceActionSource, AffordanceState, AffordanceSurface, ChatMessage, Conversation, HostError,
    UiAction,
};
pub use logging::setup_logging;
pub use retry::{
    ActionTrigger, MachineError, Phase, RetryMachine, RetryMachineHandle, RetryMechanism, RetryReason,
    SessionSnapshot, Verdict, evaluate,
};
