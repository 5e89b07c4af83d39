//! RetrySession - the per-conversation retry bookkeeping

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::events::GenerationKind;

/// Lifecycle phase of the retry state machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Nothing in flight
    Idle,
    /// A user-initiated generation is running
    AwaitingResult,
    /// Generation ended; the deferred evaluation is pending
    Checking,
    /// A retry was issued; waiting for its generation to end
    Retrying,
}

/// How the first generation of the session was initiated
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitialTrigger {
    Normal,
    /// Started by a swipe; a swipe that silently fails leaves the index unchanged
    SwipeCycle,
}

/// Reference point for detecting silently failed swipes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwipeBaseline {
    pub initial_trigger: InitialTrigger,
    /// Last known 1-based swipe index, -1 when unknown
    pub last_index: i64,
}

impl Default for SwipeBaseline {
    fn default() -> Self {
        Self {
            initial_trigger: InitialTrigger::Normal,
            last_index: -1,
        }
    }
}

/// Point-in-time copy of the session, for observers and tests
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    #[serde(rename = "retry-count")]
    pub retry_count: u32,
    #[serde(rename = "user-stopped")]
    pub user_stopped: bool,
    pub baseline: SwipeBaseline,
    pub epoch: u64,
}

/// Mutable retry state for the current conversation
///
/// Owned by the state machine task; nothing else mutates it.
#[derive(Debug)]
pub struct RetrySession {
    phase: Phase,
    retry_count: u32,
    user_stopped: bool,
    baseline: SwipeBaseline,
    /// Bumped on every reset; timers scheduled under an older epoch are stale
    epoch: u64,
}

impl Default for RetrySession {
    fn default() -> Self {
        Self::new()
    }
}

impl RetrySession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            retry_count: 0,
            user_stopped: false,
            baseline: SwipeBaseline::default(),
            epoch: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn user_stopped(&self) -> bool {
        self.user_stopped
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn baseline(&self) -> &SwipeBaseline {
        &self.baseline
    }

    pub fn baseline_mut(&mut self) -> &mut SwipeBaseline {
        &mut self.baseline
    }

    /// True while an evaluation or retry is in progress
    pub fn is_busy(&self) -> bool {
        matches!(self.phase, Phase::Checking | Phase::Retrying)
    }

    /// Start a fresh session for a user-initiated generation
    ///
    /// `swipe_index` is the current 1-based swipe index, read only for swipe generations.
    pub fn begin(&mut self, kind: GenerationKind, swipe_index: Option<i64>) {
        debug!(?kind, ?swipe_index, epoch = self.epoch, "RetrySession::begin: called");
        self.clear();
        self.phase = Phase::AwaitingResult;
        if kind == GenerationKind::Swipe {
            self.baseline = SwipeBaseline {
                initial_trigger: InitialTrigger::SwipeCycle,
                last_index: swipe_index.map(|index| index - 1).unwrap_or(-1),
            };
        }
    }

    /// Hard session boundary (conversation switched)
    pub fn reset(&mut self) {
        debug!(epoch = self.epoch, "RetrySession::reset: called");
        self.clear();
    }

    /// User aborted generation; suppresses retries until the next session
    pub fn stop(&mut self) {
        debug!(phase = ?self.phase, "RetrySession::stop: called");
        self.user_stopped = true;
        self.phase = Phase::Idle;
        self.epoch += 1;
    }

    /// Generation ended: open the checking window
    pub fn enter_checking(&mut self) {
        debug!(phase = ?self.phase, "RetrySession::enter_checking: called");
        self.phase = Phase::Checking;
    }

    /// Evaluation or retry round finished without further action
    pub fn release(&mut self) {
        debug!(phase = ?self.phase, "RetrySession::release: called");
        self.phase = Phase::Idle;
    }

    /// Claim the next retry attempt
    ///
    /// Returns the 1-based attempt number, or None once `max_retries` is reached
    /// (the session then returns to idle).
    pub fn try_begin_retry(&mut self, max_retries: u32) -> Option<u32> {
        debug!(retry_count = self.retry_count, max_retries, "RetrySession::try_begin_retry: called");
        if self.retry_count >= max_retries {
            self.phase = Phase::Idle;
            return None;
        }
        self.retry_count += 1;
        self.phase = Phase::Retrying;
        Some(self.retry_count)
    }

    /// Record the swipe index observed after a swipe action settled
    pub fn refresh_swipe_index(&mut self, index: i64) {
        debug!(from = self.baseline.last_index, to = index, "RetrySession::refresh_swipe_index: called");
        self.baseline.last_index = index;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            retry_count: self.retry_count,
            user_stopped: self.user_stopped,
            baseline: self.baseline,
            epoch: self.epoch,
        }
    }

    fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.retry_count = 0;
        self.user_stopped = false;
        self.baseline = SwipeBaseline::default();
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = RetrySession::new();
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.retry_count(), 0);
        assert!(!session.user_stopped());
        assert!(!session.is_busy());
        assert_eq!(session.baseline().last_index, -1);
    }

    #[test]
    fn test_begin_normal_generation() {
        let mut session = RetrySession::new();
        session.begin(GenerationKind::Normal, None);

        assert_eq!(session.phase(), Phase::AwaitingResult);
        assert_eq!(session.baseline(), &SwipeBaseline::default());
        assert_eq!(session.epoch(), 1);
    }

    #[test]
    fn test_begin_swipe_records_baseline() {
        let mut session = RetrySession::new();
        session.begin(GenerationKind::Swipe, Some(3));

        assert_eq!(session.baseline().initial_trigger, InitialTrigger::SwipeCycle);
        assert_eq!(session.baseline().last_index, 2);

        session.begin(GenerationKind::Swipe, None);
        assert_eq!(session.baseline().initial_trigger, InitialTrigger::SwipeCycle);
        assert_eq!(session.baseline().last_index, -1);
    }

    #[test]
    fn test_retry_bound() {
        let mut session = RetrySession::new();
        session.begin(GenerationKind::Normal, None);

        session.enter_checking();
        assert_eq!(session.try_begin_retry(2), Some(1));
        assert_eq!(session.phase(), Phase::Retrying);

        session.enter_checking();
        assert_eq!(session.try_begin_retry(2), Some(2));

        session.enter_checking();
        assert_eq!(session.try_begin_retry(2), None);
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.retry_count(), 2);
    }

    #[test]
    fn test_stop_and_reset() {
        let mut session = RetrySession::new();
        session.begin(GenerationKind::Normal, None);
        session.enter_checking();
        session.try_begin_retry(3);

        let epoch = session.epoch();
        session.stop();
        assert!(session.user_stopped());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(session.retry_count(), 1);
        assert!(session.epoch() > epoch);

        session.reset();
        assert!(!session.user_stopped());
        assert_eq!(session.retry_count(), 0);
    }
}
