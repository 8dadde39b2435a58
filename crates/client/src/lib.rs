//! Client-resident job lifecycle controller.
//!
//! One [`LifecycleController`](controller::LifecycleController) instance
//! drives one submission from upload through admission to a terminal
//! state: it subscribes to the push channel for low-latency updates, runs
//! a low-frequency reconciliation poll as the correctness backstop,
//! enforces a hard wall-clock timeout, and offers cancellation while the
//! job is still queued.

pub mod api;
pub mod controller;
pub mod error;
pub mod progress;
pub mod push;
pub mod transition;

pub use api::{HttpJobApi, JobApi};
pub use controller::{ControllerConfig, InputAsset, InputUploader, LifecycleController, Submission};
pub use error::ControllerError;
pub use transition::Phase;
