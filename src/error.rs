//! # Error Types
//!
//! Error handling for the framing, session, and routing layers.
//!
//! ## Error Categories
//! - **Transport errors**: accept/read/write failures and timeouts
//! - **Framing errors**: malformed header, oversized length, truncated payload
//! - **Codec errors**: payload (de)serialization failures
//! - **Lifecycle errors**: sending to a closed session, serving a stopped server
//! - **Configuration errors**: invalid addresses and option values
//!
//! Transport and framing errors are fatal to the session that produced them and are
//! never retried, with the single exception of write timeouts (see `write_attempts`).
//!
//! ## Example Usage
//! ```rust
//! use tcp_router::error::{ProtocolError, Result};
//!
//! fn check_len(len: usize, max: usize) -> Result<()> {
//!     if len > max {
//!         return Err(ProtocolError::OversizedPacket(len));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_len(10, 4).is_err());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Framing errors
    pub const ERR_INVALID_HEADER: &str = "Invalid packet header";
    pub const ERR_OVERSIZED_PACKET: &str = "Packet exceeds maximum size";
    pub const ERR_TRUNCATED_PACKET: &str = "Connection closed mid-frame";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_SESSION_CLOSED: &str = "Session closed";
    pub const ERR_TIMEOUT: &str = "Operation timed out";

    /// Server lifecycle
    pub const ERR_SERVER_STOPPED: &str = "Server stopped";

    /// Codec errors
    pub const ERR_NO_REQUEST: &str = "Context carries no request";
}

/// Primary error type for all framing, session and routing operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("{}", constants::ERR_INVALID_HEADER)]
    InvalidHeader,

    #[error("{}: {0} bytes", constants::ERR_OVERSIZED_PACKET)]
    OversizedPacket(usize),

    #[error("{}: {0} trailing bytes", constants::ERR_TRUNCATED_PACKET)]
    TruncatedPacket(usize),

    #[error("{}", constants::ERR_CONNECTION_CLOSED)]
    ConnectionClosed,

    #[error("{}", constants::ERR_SESSION_CLOSED)]
    SessionClosed,

    #[error("{}", constants::ERR_SERVER_STOPPED)]
    ServerStopped,

    #[error("{}", constants::ERR_TIMEOUT)]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// Whether this error came out of the framing layer
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidHeader
                | ProtocolError::OversizedPacket(_)
                | ProtocolError::TruncatedPacket(_)
        )
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
