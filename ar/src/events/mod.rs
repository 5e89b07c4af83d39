//! Lifecycle Event Bridge
//!
//! The chat host publishes four lifecycle events. Host glue code emits them
//! onto an [`EventBus`]; the retry state machine subscribes to it.
//!
//! ```text
//!  host glue ──emit──▶ EventBus (tokio::sync::broadcast) ──▶ RetryMachine forwarder
//!                                                       └──▶ other subscribers
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use autoretry::events::create_event_bus;
//!
//! let bus = create_event_bus();
//! bus.generation_started(Some("swipe"));
//! bus.generation_ended();
//! ```

mod bus;
mod types;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, create_event_bus};
pub use types::{GenerationKind, LifecycleEvent};
