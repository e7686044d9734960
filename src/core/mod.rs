//! # Core Protocol Components
//!
//! Message entries, packet framing, and payload serialization.
//!
//! This module turns an unbounded byte stream into discrete message entries and back.
//!
//! ## Components
//! - **Entry**: the logical message, an id plus payload bytes
//! - **Packer**: pluggable framing of entries into length-prefixed packets
//! - **Codec**: Tokio codec adapting any packer to `FramedRead`/`FramedWrite`
//! - **Serialization**: optional payload formats applied on top of framing
//!
//! ## Wire Format (default packer)
//! ```text
//! [DataLength(4, LE)] [MessageId(4, LE)] [Data(N)]
//! ```
//!
//! ## Security
//! - Maximum data size: 1 MiB by default (configurable)
//! - Length validation before allocation

pub mod codec;
pub mod message;
pub mod packet;
pub mod serialization;
