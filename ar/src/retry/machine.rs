//! Retry State Machine - the task that owns the RetrySession
//!
//! All state transitions happen on this one task, one request at a time.
//! Timers and UI actions run on spawned tasks and report back through the
//! same channel, tagged with the session epoch they were scheduled under;
//! anything tagged with an older epoch is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{RetrySettings, SettingsSource, TimingConfig};
use crate::events::{GenerationKind, LifecycleEvent};
use crate::host::{ActionSource, Conversation};

use super::evaluator::{Observation, RetryMechanism, RetryReason, Verdict, evaluate};
use super::handle::RetryMachineHandle;
use super::messages::MachineRequest;
use super::session::{Phase, RetrySession};
use super::trigger::ActionTrigger;

/// Channel buffer size for machine requests
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// The retry state machine
pub struct RetryMachine {
    settings: Arc<dyn SettingsSource>,
    conversation: Arc<dyn Conversation>,
    trigger: ActionTrigger,
    timing: TimingConfig,
    session: RetrySession,
    tx: mpsc::Sender<MachineRequest>,
    rx: mpsc::Receiver<MachineRequest>,
}

impl RetryMachine {
    /// Create a new machine wired to the host collaborators
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        conversation: Arc<dyn Conversation>,
        actions: Arc<dyn ActionSource>,
        timing: TimingConfig,
    ) -> Self {
        debug!(?timing, "RetryMachine::new: called");
        let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_BUFFER);
        Self {
            settings,
            conversation,
            trigger: ActionTrigger::new(actions, timing.clone()),
            timing,
            session: RetrySession::new(),
            tx,
            rx,
        }
    }

    /// Get a handle for dispatching events and reading snapshots
    pub fn handle(&self) -> RetryMachineHandle {
        RetryMachineHandle::new(self.tx.clone())
    }

    /// Spawn the machine task
    pub fn spawn(self) -> (RetryMachineHandle, JoinHandle<()>) {
        let handle = self.handle();
        let join = tokio::spawn(self.run());
        (handle, join)
    }

    /// Run the machine task
    ///
    /// Consumes the machine and runs until shutdown is requested.
    pub async fn run(mut self) {
        info!("Retry machine started");

        while let Some(req) = self.rx.recv().await {
            match req {
                MachineRequest::Lifecycle(event) => self.on_lifecycle(event),
                MachineRequest::EvaluationDue { epoch } => self.on_evaluation_due(epoch),
                MachineRequest::RetryDue {
                    epoch,
                    attempt,
                    mechanism,
                } => self.on_retry_due(epoch, attempt, mechanism),
                MachineRequest::ActionFinished {
                    epoch,
                    attempt,
                    performed,
                } => self.on_action_finished(epoch, attempt, performed),
                MachineRequest::SwipeIndexRefreshed { epoch, index } => self.on_swipe_index_refreshed(epoch, index),
                MachineRequest::Snapshot { reply_tx } => {
                    let _ = reply_tx.send(self.session.snapshot());
                }
                MachineRequest::Shutdown => {
                    info!("Retry machine shutting down");
                    break;
                }
            }
        }
    }

    fn on_lifecycle(&mut self, event: LifecycleEvent) {
        debug!(event_type = event.event_type(), phase = ?self.session.phase(), "RetryMachine::on_lifecycle: called");
        match event {
            LifecycleEvent::GenerationStarted { trigger } => self.on_generation_started(trigger.as_deref()),
            LifecycleEvent::GenerationEnded => self.on_generation_ended(),
            LifecycleEvent::GenerationStopped => {
                info!("User stopped generation");
                self.session.stop();
            }
            LifecycleEvent::ChatChanged => {
                info!("Chat changed, retry state reset");
                self.session.reset();
            }
        }
    }

    fn on_generation_started(&mut self, trigger: Option<&str>) {
        // A retry we issued starts a generation too; it must not wipe the bookkeeping
        if self.session.is_busy() {
            debug!(phase = ?self.session.phase(), "Ignoring GenerationStarted while busy");
            return;
        }

        let kind = GenerationKind::from_trigger(trigger);
        let swipe_index = match kind {
            GenerationKind::Swipe => {
                let index = self.read_swipe_index();
                if index.is_none() {
                    warn!("Swipe generation started but the swipe index is unavailable");
                }
                index
            }
            _ => None,
        };

        self.session.begin(kind, swipe_index);
        info!(?kind, baseline = self.session.baseline().last_index, "New generation cycle, retry state reset");
    }

    fn on_generation_ended(&mut self) {
        if !self.settings.current().enabled {
            debug!("RetryMachine::on_generation_ended: disabled");
            return;
        }
        if self.session.phase() == Phase::Checking {
            debug!("RetryMachine::on_generation_ended: already checking");
            return;
        }

        info!(retry_count = self.session.retry_count(), "Generation ended, entering checking window");
        self.session.enter_checking();
        let epoch = self.session.epoch();
        self.schedule(self.timing.evaluation_delay(), MachineRequest::EvaluationDue { epoch });
    }

    fn on_evaluation_due(&mut self, epoch: u64) {
        if epoch != self.session.epoch() || self.session.phase() != Phase::Checking {
            debug!(epoch, current = self.session.epoch(), "Dropping stale evaluation");
            return;
        }

        let settings = self.settings.current();
        if !settings.enabled || self.session.user_stopped() {
            info!(
                enabled = settings.enabled,
                user_stopped = self.session.user_stopped(),
                "Skipping retry check"
            );
            self.session.release();
            return;
        }

        let observation = self.observe();
        match evaluate(&settings, &observation, self.session.baseline_mut()) {
            Verdict::Accept => {
                info!("Response accepted, monitoring round finished");
                self.session.release();
            }
            Verdict::Retry { mechanism, reason } => self.begin_retry(&settings, mechanism, &reason),
        }
    }

    fn begin_retry(&mut self, settings: &RetrySettings, mechanism: RetryMechanism, reason: &RetryReason) {
        let Some(attempt) = self.session.try_begin_retry(settings.max_retries) else {
            info!(max_retries = settings.max_retries, %reason, "Maximum retries reached, giving up");
            return;
        };

        info!(attempt, max_retries = settings.max_retries, ?mechanism, %reason, "Scheduling retry");
        let epoch = self.session.epoch();
        self.schedule(
            settings.retry_delay(),
            MachineRequest::RetryDue {
                epoch,
                attempt,
                mechanism,
            },
        );
    }

    fn on_retry_due(&mut self, epoch: u64, attempt: u32, mechanism: RetryMechanism) {
        if !self.is_current(epoch, attempt) || self.session.phase() != Phase::Retrying {
            debug!(epoch, attempt, phase = ?self.session.phase(), "Dropping stale retry");
            return;
        }

        debug!(attempt, ?mechanism, "RetryMachine::on_retry_due: performing action");
        let trigger = self.trigger.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let performed = trigger.perform(mechanism).await;
            let _ = tx
                .send(MachineRequest::ActionFinished {
                    epoch,
                    attempt,
                    performed,
                })
                .await;
        });
    }

    fn on_action_finished(&mut self, epoch: u64, attempt: u32, performed: Option<RetryMechanism>) {
        if !self.is_current(epoch, attempt) {
            debug!(epoch, attempt, "Dropping stale action result");
            return;
        }

        let Some(mechanism) = performed else {
            info!(attempt, "No retry method available, abandoning this round");
            if self.session.phase() == Phase::Retrying {
                self.session.release();
            }
            return;
        };

        let max_retries = self.settings.current().max_retries;
        info!(attempt, max_retries, ?mechanism, "Retry triggered");
        // A swipe cycle re-runs the variant the user is already looking at; no notice
        if mechanism != RetryMechanism::SwipeCycle {
            self.trigger
                .notify(&format!("Retry triggered ({}/{})", attempt, max_retries));
        }

        if mechanism.moves_swipe() {
            self.schedule_swipe_refresh(epoch);
        }
    }

    fn on_swipe_index_refreshed(&mut self, epoch: u64, index: Option<i64>) {
        if epoch != self.session.epoch() {
            debug!(epoch, "Dropping stale swipe index");
            return;
        }
        match index {
            Some(index) => self.session.refresh_swipe_index(index),
            None => warn!("Swipe index unavailable after swipe"),
        }
    }

    fn is_current(&self, epoch: u64, attempt: u32) -> bool {
        epoch == self.session.epoch() && attempt == self.session.retry_count()
    }

    fn observe(&self) -> Observation {
        let last_message = match self.conversation.last_message() {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Failed to read last message, treating as empty");
                None
            }
        };
        Observation {
            last_message,
            swipe_index: self.read_swipe_index(),
        }
    }

    fn read_swipe_index(&self) -> Option<i64> {
        match self.conversation.current_swipe_index() {
            Ok(index) => index,
            Err(e) => {
                warn!(error = %e, "Failed to read swipe index");
                None
            }
        }
    }

    /// Send `request` back to this task after `delay`
    fn schedule(&self, delay: Duration, request: MachineRequest) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(request).await;
        });
    }

    fn schedule_swipe_refresh(&self, epoch: u64) {
        let conversation = self.conversation.clone();
        let settle = self.timing.swipe_settle();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settle).await;
            let index = match conversation.current_swipe_index() {
                Ok(index) => index,
                Err(e) => {
                    warn!(error = %e, "Failed to read swipe index after swipe");
                    None
                }
            };
            let _ = tx.send(MachineRequest::SwipeIndexRefreshed { epoch, index }).await;
        });
    }
}
