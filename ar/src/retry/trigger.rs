//! Action Trigger - carries out retry mechanisms on the host UI

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TimingConfig;
use crate::host::{ActionSource, UiAction};

use super::evaluator::RetryMechanism;

/// Performs corrective actions through an [`ActionSource`]
///
/// Cheap to clone; each retry round runs on its own task with its own clone.
#[derive(Clone)]
pub struct ActionTrigger {
    source: Arc<dyn ActionSource>,
    timing: TimingConfig,
}

impl ActionTrigger {
    pub fn new(source: Arc<dyn ActionSource>, timing: TimingConfig) -> Self {
        debug!(?timing, "ActionTrigger::new: called");
        Self { source, timing }
    }

    /// Regenerate the last response
    pub async fn regenerate(&self) -> bool {
        debug!("ActionTrigger::regenerate: called");
        self.source.try_invoke(UiAction::Regenerate).await
    }

    /// Show the next alternate response
    pub async fn advance_swipe(&self) -> bool {
        debug!("ActionTrigger::advance_swipe: called");
        self.source.try_invoke(UiAction::SwipeAdvance).await
    }

    /// Swipe back, pause, then swipe forward to re-run the current variant slot
    pub async fn cycle_swipe(&self) -> bool {
        debug!("ActionTrigger::cycle_swipe: called");
        if !self.source.try_invoke(UiAction::SwipePrevious).await {
            warn!("Swipe cycle aborted: previous-variant action unavailable");
            return false;
        }
        tokio::time::sleep(self.timing.swipe_pause()).await;
        self.source.try_invoke(UiAction::SwipeNext).await
    }

    /// Run `mechanism`, falling back to a plain swipe advance if it fails
    ///
    /// Returns the mechanism that succeeded, or None when nothing worked.
    pub async fn perform(&self, mechanism: RetryMechanism) -> Option<RetryMechanism> {
        debug!(?mechanism, "ActionTrigger::perform: called");
        let succeeded = match mechanism {
            RetryMechanism::Regenerate => self.regenerate().await,
            RetryMechanism::SwipeCycle => self.cycle_swipe().await,
            RetryMechanism::SwipeAdvance => self.advance_swipe().await,
        };
        if succeeded {
            return Some(mechanism);
        }
        if mechanism == RetryMechanism::SwipeAdvance {
            return None;
        }

        info!(?mechanism, "Retry action failed, falling back to swipe advance");
        if self.advance_swipe().await {
            Some(RetryMechanism::SwipeAdvance)
        } else {
            None
        }
    }

    /// Tell the user a retry was issued
    pub fn notify(&self, message: &str) {
        self.source.notify(message);
    }
}
