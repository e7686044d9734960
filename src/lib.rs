//! # tcp-router
//!
//! Message-oriented TCP server framework.
//!
//! Connections are framed into [`Entry`] values by a pluggable [`Packer`], each
//! connection is a [`Session`] with its own inbound and outbound task, and every request
//! is routed by message id through a middleware chain on a single dispatch stage.
//!
//! ## Layout
//! - [`core`]: entries, packers, codec, payload serialization
//! - [`transport`]: sessions and the session registry
//! - [`protocol`]: context, router, middlewares, dispatch
//! - [`service`]: server and client
//! - [`config`], [`error`], [`utils`]: configuration, errors, logging, metrics, timeouts

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::config::NetworkConfig;
pub use crate::core::codec::PacketCodec;
pub use crate::core::message::{Entry, MessageId};
pub use crate::core::packet::{DefaultPacker, Packer};
pub use crate::core::serialization::SerializationFormat;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::context::Context;
pub use crate::protocol::router::{handler, middleware, HandlerFunc, MiddlewareFunc, Router};
pub use crate::service::client::Client;
pub use crate::service::server::{Server, SessionHook};
pub use crate::transport::registry::SessionRegistry;
pub use crate::transport::session::{Session, SessionId};
