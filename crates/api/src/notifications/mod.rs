//! Event-to-WebSocket notification routing.

mod router;

pub use router::NotificationRouter;
