//! # Utility Modules
//!
//! Supporting utilities for logging, timing, and observability.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Timeout**: Async timeout wrappers with zero-means-unbounded semantics
//! - **Metrics**: Thread-safe observability counters

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{global_metrics, MetricsSnapshot};
