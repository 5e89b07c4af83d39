//! Auto-retry core
//!
//! ```text
//!  LifecycleEvent ──▶ RetryMachine task ──owns──▶ RetrySession
//!                        │   ▲
//!              schedule  │   │ EvaluationDue / RetryDue / ActionFinished
//!                        ▼   │
//!                   timer and action tasks ──▶ ActionTrigger ──▶ ActionSource
//! ```
//!
//! [`evaluate`] is pure; everything with side effects goes through the
//! machine task so the session is only ever touched from one place.

mod evaluator;
mod handle;
mod machine;
mod messages;
mod session;
mod trigger;

pub use evaluator::{Observation, RetryMechanism, RetryReason, Verdict, evaluate};
pub use handle::RetryMachineHandle;
pub use machine::{DEFAULT_CHANNEL_BUFFER, RetryMachine};
pub use messages::{MachineError, MachineRequest};
pub use session::{InitialTrigger, Phase, RetrySession, SessionSnapshot, SwipeBaseline};
pub use trigger::ActionTrigger;
