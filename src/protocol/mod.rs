//! # Routing Layer
//!
//! Contexts, route registration, middlewares, and the single dispatch stage.
//!
//! ## Components
//! - **Context**: one request/response interaction bound to a target session
//! - **Router**: route table under construction (message id -> handler + middlewares)
//! - **Dispatcher**: the compiled table and the task consuming the shared request queue
//! - **Middleware**: built-in `recover` and `log_requests` wrappers
//!
//! ## Execution Model
//! Exactly one dispatch task runs per server. It executes one chain at a time, so
//! handlers never run concurrently with each other; handlers doing heavy work should
//! spawn it and post the response later through a copied or allocated context.

pub mod context;
pub mod dispatcher;
pub mod middleware;
pub mod router;
