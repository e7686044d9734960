//! Built-in middlewares.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, info};

use crate::protocol::context::Context;
use crate::protocol::dispatcher::panic_message;
use crate::protocol::router::{middleware, HandlerFunc, MiddlewareFunc};

/// Catch a panic in the rest of the chain and log it.
///
/// The dispatch stage survives handler panics on its own; registering this keeps any
/// response set before the panic and records which session triggered it.
pub fn recover() -> MiddlewareFunc {
    middleware(|next: HandlerFunc| {
        let wrapped: HandlerFunc = Arc::new(move |ctx: &mut Context| {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| next(ctx))) {
                error!(
                    session_id = ctx.session().id(),
                    message_id = ?ctx.request().map(|r| r.id),
                    panic = %panic_message(panic.as_ref()),
                    "Recovered from handler panic"
                );
            }
        });
        wrapped
    })
}

/// Log each request and the response the chain produced.
pub fn log_requests() -> MiddlewareFunc {
    middleware(|next: HandlerFunc| {
        let wrapped: HandlerFunc = Arc::new(move |ctx: &mut Context| {
            if let Some(req) = ctx.request() {
                info!(
                    session_id = ctx.session().id(),
                    message_id = req.id,
                    size = req.len(),
                    "Request received"
                );
            }
            next(ctx);
            if let Some(resp) = ctx.response() {
                info!(
                    session_id = ctx.session().id(),
                    message_id = resp.id,
                    size = resp.len(),
                    "Response ready"
                );
            }
        });
        wrapped
    })
}
