//! Host collaborator error types

use thiserror::Error;

/// Failures reported by host collaborators (conversation accessor, UI surface)
///
/// None of these are fatal: the retry machinery logs them and treats the
/// read as absent or the action as failed.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Host unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed host data: {0}")]
    Malformed(String),

    #[error("Affordance '{name}' could not be activated: {reason}")]
    Activation { name: String, reason: String },
}

impl HostError {
    /// Create an activation error
    pub fn activation(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Activation {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
