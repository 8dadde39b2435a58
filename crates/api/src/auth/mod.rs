//! Authentication helpers.
//!
//! Token issuance happens in the platform's account service; this server
//! only validates bearer tokens presented on API and WebSocket requests.

pub mod jwt;
