//! # Service Layer
//!
//! The server that wires listener, sessions, and router together, plus a framed client.

pub mod client;
pub mod server;
