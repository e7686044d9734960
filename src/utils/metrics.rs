//! Observability and Metrics
//!
//! Process-wide counters for sessions, traffic, and dispatch outcomes.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Global metrics collector for server operations
#[derive(Debug)]
pub struct Metrics {
    /// Total sessions created
    pub sessions_total: AtomicU64,
    /// Currently open sessions
    pub sessions_active: AtomicU64,
    /// Total entries read from connections
    pub messages_received: AtomicU64,
    /// Total entries written to connections
    pub messages_sent: AtomicU64,
    /// Total payload bytes received
    pub bytes_received: AtomicU64,
    /// Total framed bytes sent
    pub bytes_sent: AtomicU64,
    /// Sessions closed because of a framing error
    pub framing_errors: AtomicU64,
    /// Sessions closed because writing failed after all attempts
    pub write_failures: AtomicU64,
    /// Handler chains that panicked
    pub handler_panics: AtomicU64,
    /// Requests with no registered route
    pub routes_not_found: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            framing_errors: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
            routes_not_found: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session fully closed
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record an entry written to a connection
    pub fn message_sent(&self, byte_count: u64) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    /// Record an entry read from a connection
    pub fn message_received(&self, byte_count: u64) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_panic(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn route_not_found(&self) {
        self.routes_not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            routes_not_found: self.routes_not_found.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            sessions_total = snapshot.sessions_total,
            sessions_active = snapshot.sessions_active,
            messages_received = snapshot.messages_received,
            messages_sent = snapshot.messages_sent,
            bytes_received = snapshot.bytes_received,
            bytes_sent = snapshot.bytes_sent,
            framing_errors = snapshot.framing_errors,
            write_failures = snapshot.write_failures,
            handler_panics = snapshot.handler_panics,
            routes_not_found = snapshot.routes_not_found,
            uptime_seconds = snapshot.uptime_seconds,
            "Server metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub framing_errors: u64,
    pub write_failures: u64,
    pub handler_panics: u64,
    pub routes_not_found: u64,
    pub uptime_seconds: u64,
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}
