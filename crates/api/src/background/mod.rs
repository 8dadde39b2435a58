//! Long-running background tasks spawned at startup.

pub mod session_reaper;

pub use session_reaper::SessionReaper;
