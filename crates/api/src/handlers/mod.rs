pub mod account;
pub mod jobs;
pub mod queue;
pub mod sessions;
pub mod webhooks;
