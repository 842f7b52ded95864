//! Authentication module for the Bluesky XRPC API.
//!
//! Provides the session entity and its manager (login, proactive refresh,
//! and recovery after a rejected access token).

mod manager;
mod session;

pub use manager::SessionManager;
pub use session::{Bearer, Credentials, Session};
