//! Job admission and scheduling engine.
//!
//! [`QueueManager`] coordinates admission, the global FIFO queue, and
//! dispatch to the external worker; [`notify`] pairs job store transitions
//! with event-bus publication.

pub mod notify;
pub mod queue;

pub use queue::{AdmissionSnapshot, AdvanceOutcome, QueueManager, QueueStatus, SubmitOutcome};
