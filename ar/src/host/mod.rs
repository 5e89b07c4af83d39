//! External collaborators provided by the chat host
//!
//! - [`Conversation`] - read-only view of the current conversation
//! - [`ActionSource`] - performs corrective UI actions
//! - [`AffordanceSurface`] - named, clickable controls behind [`AffordanceActionSource`]

mod actions;
mod conversation;
mod error;

pub use actions::{ActionSource, AffordanceActionSource, AffordanceState, AffordanceSurface, UiAction};
pub use conversation::{ChatMessage, Conversation};
pub use error::HostError;
