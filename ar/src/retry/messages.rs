//! Message types for the retry state machine

use thiserror::Error;
use tokio::sync::oneshot;

use crate::events::LifecycleEvent;

use super::evaluator::RetryMechanism;
use super::session::SessionSnapshot;

/// Errors from talking to the state machine task
#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Retry machine channel closed")]
    ChannelClosed,

    #[error("Retry machine dropped the reply")]
    NoReply,
}

/// Requests processed by the state machine task, one at a time
#[derive(Debug)]
pub enum MachineRequest {
    /// A lifecycle event from the host
    Lifecycle(LifecycleEvent),

    /// The checking window elapsed (internal)
    EvaluationDue { epoch: u64 },

    /// The retry delay elapsed (internal)
    RetryDue {
        epoch: u64,
        attempt: u32,
        mechanism: RetryMechanism,
    },

    /// The retry action task finished (internal)
    ActionFinished {
        epoch: u64,
        attempt: u32,
        performed: Option<RetryMechanism>,
    },

    /// The swipe index was re-read after a swipe settled (internal)
    SwipeIndexRefreshed { epoch: u64, index: Option<i64> },

    /// Get a copy of the session
    Snapshot { reply_tx: oneshot::Sender<SessionSnapshot> },

    /// Stop the state machine task
    Shutdown,
}
