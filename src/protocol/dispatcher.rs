use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::message::MessageId;
use crate::protocol::context::Context;
use crate::protocol::router::HandlerFunc;
use crate::utils::metrics::global_metrics;

/// Result of running one context through the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A route matched and its chain completed
    Handled,
    /// No route matched; the not-found chain completed
    NotFound,
    /// No route matched and no not-found handler is set
    Dropped,
    /// The chain panicked
    Panicked,
}

/// Compiled, immutable routing table.
pub struct RouteTable {
    chains: HashMap<MessageId, HandlerFunc>,
    not_found: Option<HandlerFunc>,
}

impl RouteTable {
    pub(crate) fn new(
        chains: HashMap<MessageId, HandlerFunc>,
        not_found: Option<HandlerFunc>,
    ) -> Self {
        Self { chains, not_found }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    /// Run the chain for `ctx` to completion. A panic is contained here and reported
    /// as [`DispatchOutcome::Panicked`].
    pub fn dispatch(&self, ctx: &mut Context) -> DispatchOutcome {
        let id = ctx.request().map(|r| r.id);
        let routed = id.and_then(|id| self.chains.get(&id));

        let (chain, outcome) = match (routed, &self.not_found) {
            (Some(chain), _) => (chain, DispatchOutcome::Handled),
            (None, Some(not_found)) => {
                global_metrics().route_not_found();
                (not_found, DispatchOutcome::NotFound)
            }
            (None, None) => {
                global_metrics().route_not_found();
                debug!(message_id = ?id, "No route, dropping request");
                return DispatchOutcome::Dropped;
            }
        };

        match catch_unwind(AssertUnwindSafe(|| chain(ctx))) {
            Ok(()) => outcome,
            Err(panic) => {
                global_metrics().handler_panic();
                error!(
                    message_id = ?id,
                    session_id = ctx.session().id(),
                    panic = %panic_message(panic.as_ref()),
                    "Handler chain panicked"
                );
                DispatchOutcome::Panicked
            }
        }
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The single dispatch stage.
///
/// Pulls one context at a time off the shared request queue, runs its chain to
/// completion and posts the response, if any, to the context's target session before
/// pulling the next. Once `stop` fires no further contexts are dequeued; the one in
/// flight finishes normally.
pub async fn consume_requests(
    table: Arc<RouteTable>,
    mut requests: mpsc::Receiver<Context>,
    stop: CancellationToken,
) {
    loop {
        let mut ctx = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            next = requests.recv() => match next {
                Some(ctx) => ctx,
                None => break,
            },
        };

        table.dispatch(&mut ctx);
        if ctx.response().is_none() {
            continue;
        }

        let session_id = ctx.session().id();
        if let Err(e) = ctx.send().await {
            debug!(session_id, error = %e, "Response dropped");
        }
    }

    requests.close();
    info!("Router stopped");
}
