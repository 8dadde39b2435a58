//! Worker adapter: the only component aware of per-kind specifics of the
//! external generation API.
//!
//! The queue manager talks to the [`WorkerDispatch`] trait; production wires
//! in [`HttpWorkerGateway`], tests substitute an in-memory stub. Adding a
//! new tool kind means one mapping in [`tools`] -- the scheduler is never
//! touched.

pub mod dispatch;
pub mod gateway;
pub mod tools;

pub use dispatch::{DispatchReceipt, DispatchRequest, WorkerDispatch, WorkerError};
pub use gateway::HttpWorkerGateway;
