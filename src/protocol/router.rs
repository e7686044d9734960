//! Route registration.
//!
//! Routes are registered before serving starts. When the server starts, every route is
//! compiled into a single chain ([`Router::compile`]), executed in this order:
//!
//! ```text
//! global middlewares (registration order) -> route middlewares (registration order) -> handler
//! ```
//!
//! The not-found handler is wrapped by the global middlewares only.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::core::message::MessageId;
use crate::protocol::context::Context;
use crate::protocol::dispatcher::RouteTable;

/// Terminal step of a chain
pub type HandlerFunc = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Wraps the next step of a chain. The returned handler decides whether, and when,
/// to call `next`.
pub type MiddlewareFunc = Arc<dyn Fn(HandlerFunc) -> HandlerFunc + Send + Sync>;

/// Box a closure as a [`HandlerFunc`]
pub fn handler<F>(f: F) -> HandlerFunc
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a [`MiddlewareFunc`]
pub fn middleware<F>(f: F) -> MiddlewareFunc
where
    F: Fn(HandlerFunc) -> HandlerFunc + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Route {
    handler: HandlerFunc,
    handler_name: &'static str,
    middlewares: Vec<MiddlewareFunc>,
}

/// Route table under construction.
#[derive(Default)]
pub struct Router {
    routes: BTreeMap<MessageId, Route>,
    global: Vec<MiddlewareFunc>,
    not_found: Option<HandlerFunc>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `id`, replacing any earlier route for the same id.
    pub fn add_route<H, I>(&mut self, id: MessageId, handler: H, middlewares: I)
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        I: IntoIterator<Item = MiddlewareFunc>,
    {
        let route = Route {
            handler: Arc::new(handler),
            handler_name: std::any::type_name::<H>(),
            middlewares: middlewares.into_iter().collect(),
        };
        self.routes.insert(id, route);
    }

    /// Append global middlewares, run before every route's own middlewares
    pub fn use_middleware<I>(&mut self, middlewares: I)
    where
        I: IntoIterator<Item = MiddlewareFunc>,
    {
        self.global.extend(middlewares);
    }

    /// Handler for ids with no route. Unset, such requests are dropped.
    pub fn set_not_found_handler<H>(&mut self, handler: H)
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(handler));
    }

    pub fn route_ids(&self) -> impl Iterator<Item = MessageId> + '_ {
        self.routes.keys().copied()
    }

    pub fn has_route(&self, id: MessageId) -> bool {
        self.routes.contains_key(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Log the route table
    pub fn print_routes(&self, addr: &str) {
        info!(
            address = %addr,
            routes = self.routes.len(),
            global_middlewares = self.global.len(),
            "Route table"
        );
        for (id, route) in &self.routes {
            info!(
                message_id = id,
                handler = route.handler_name,
                middlewares = route.middlewares.len(),
                "Route"
            );
        }
    }

    /// Compose every route into its final chain.
    pub fn compile(&self) -> RouteTable {
        let chains = self
            .routes
            .iter()
            .map(|(id, route)| {
                let chain = compose(&self.global, &route.middlewares, Arc::clone(&route.handler));
                (*id, chain)
            })
            .collect();

        let not_found = self
            .not_found
            .as_ref()
            .map(|h| compose(&self.global, &[], Arc::clone(h)));

        RouteTable::new(chains, not_found)
    }
}

fn compose(
    global: &[MiddlewareFunc],
    route: &[MiddlewareFunc],
    terminal: HandlerFunc,
) -> HandlerFunc {
    let wrapped = route.iter().rev().fold(terminal, |next, mw| mw(next));
    global.iter().rev().fold(wrapped, |next, mw| mw(next))
}
