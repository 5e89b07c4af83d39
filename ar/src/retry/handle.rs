//! RetryMachineHandle - client interface to the retry state machine

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventBus, LifecycleEvent};

use super::messages::{MachineError, MachineRequest};
use super::session::SessionSnapshot;

/// Handle for feeding the state machine and observing it
///
/// Cloneable; all clones talk to the same machine task.
#[derive(Clone)]
pub struct RetryMachineHandle {
    tx: mpsc::Sender<MachineRequest>,
}

impl RetryMachineHandle {
    pub(crate) fn new(tx: mpsc::Sender<MachineRequest>) -> Self {
        Self { tx }
    }

    /// Deliver a lifecycle event directly
    pub async fn dispatch(&self, event: LifecycleEvent) -> Result<(), MachineError> {
        debug!(event_type = event.event_type(), "RetryMachineHandle::dispatch: called");
        self.tx
            .send(MachineRequest::Lifecycle(event))
            .await
            .map_err(|_| MachineError::ChannelClosed)
    }

    /// Get a copy of the current session
    pub async fn snapshot(&self) -> Result<SessionSnapshot, MachineError> {
        debug!("RetryMachineHandle::snapshot: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(MachineRequest::Snapshot { reply_tx })
            .await
            .map_err(|_| MachineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| MachineError::NoReply)
    }

    /// Stop the machine task
    pub async fn shutdown(&self) -> Result<(), MachineError> {
        debug!("RetryMachineHandle::shutdown: called");
        self.tx
            .send(MachineRequest::Shutdown)
            .await
            .map_err(|_| MachineError::ChannelClosed)
    }

    /// Subscribe the machine to an event bus
    ///
    /// Spawns a forwarder task that runs until the bus or the machine goes away.
    pub fn attach(&self, bus: &EventBus) -> JoinHandle<()> {
        debug!("RetryMachineHandle::attach: called");
        let mut rx = bus.subscribe();
        let handle = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if handle.dispatch(event).await.is_err() {
                            debug!("RetryMachineHandle::attach: machine gone, stopping forwarder");
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Lifecycle forwarder lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!("Event bus closed, stopping lifecycle forwarder");
                        break;
                    }
                }
            }
        })
    }
}
