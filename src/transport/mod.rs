//! # Transport Layer
//!
//! Per-connection sessions and the registry tracking the live ones.
//!
//! ## Components
//! - **Session**: one TCP connection, driven by an inbound and an outbound task
//! - **Registry**: concurrent id -> session map owned by the server

pub mod registry;
pub mod session;
