//! Shared domain types for the Muse generation backend.
//!
//! This crate holds everything both the server and the client-resident
//! lifecycle controller need to agree on: primitive type aliases, the
//! fixed set of tool kinds, domain errors with stable wire codes, and
//! the push-message payload for job lifecycle updates.

pub mod error;
pub mod job;
pub mod job_events;
pub mod types;

pub use error::{CoreError, QueueError};
pub use job::JobKind;
pub use job_events::JobUpdate;
