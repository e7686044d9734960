//! # TCP Server
//!
//! Owns the listening socket and wires every accepted connection into a [`Session`]
//! whose inbound task feeds the router's shared request queue.
//!
//! ## Task Layout
//! - one accept loop (the future returned by [`Server::serve`])
//! - one dispatch task consuming the request queue
//! - per connection: an inbound task, an outbound task, and a close-waiter that
//!   unregisters the session and fires the close hook once both tasks have stopped
//!
//! ## Usage
//! ```no_run
//! use std::sync::Arc;
//! use tcp_router::config::NetworkConfig;
//! use tcp_router::core::message::Entry;
//! use tcp_router::protocol::context::Context;
//! use tcp_router::service::server::Server;
//!
//! # async fn run() -> tcp_router::error::Result<()> {
//! let mut server = Server::from_config(&NetworkConfig::default());
//! server.add_route(1, |ctx: &mut Context| {
//!     let data = ctx.request().map(|r| r.data.clone()).unwrap_or_default();
//!     ctx.set_response(Entry::new(2, data));
//! }, []);
//!
//! let server = Arc::new(server);
//! server.serve("127.0.0.1:5896").await
//! # }
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{NetworkConfig, ServerConfig, TransportConfig};
use crate::core::message::MessageId;
use crate::core::packet::{DefaultPacker, Packer};
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::protocol::context::Context;
use crate::protocol::dispatcher::consume_requests;
use crate::protocol::router::{MiddlewareFunc, Router};
use crate::transport::registry::SessionRegistry;
use crate::transport::session::Session;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::ACCEPT_RETRY_DELAY;

/// Lifecycle hook receiving the affected session
pub type SessionHook = Arc<dyn Fn(Arc<Session>) + Send + Sync>;

/// Message-routing TCP server.
///
/// Register routes, middlewares and hooks through `&mut self`, then share the server
/// (typically behind an `Arc`) to call [`Server::serve`] and [`Server::stop`].
pub struct Server {
    config: ServerConfig,
    transport: TransportConfig,
    packer: Arc<dyn Packer>,
    codec: Option<SerializationFormat>,
    router: Router,
    sessions: SessionRegistry,
    on_session_create: Option<SessionHook>,
    on_session_close: Option<SessionHook>,
    stopped: CancellationToken,
    router_stop: CancellationToken,
    listener_stop: CancellationToken,
    serving: AtomicBool,
    stop_started: AtomicBool,
    local_addr: OnceLock<SocketAddr>,
}

impl Server {
    pub fn new(config: ServerConfig, transport: TransportConfig) -> Self {
        let packer: Arc<dyn Packer> =
            Arc::new(DefaultPacker::with_max_data_size(transport.max_data_size));
        let codec = transport.codec;
        Self {
            config,
            transport,
            packer,
            codec,
            router: Router::new(),
            sessions: SessionRegistry::new(),
            on_session_create: None,
            on_session_close: None,
            stopped: CancellationToken::new(),
            router_stop: CancellationToken::new(),
            listener_stop: CancellationToken::new(),
            serving: AtomicBool::new(false),
            stop_started: AtomicBool::new(false),
            local_addr: OnceLock::new(),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.server.clone(), config.transport.clone())
    }

    /// Replace the default length-prefixed packer
    pub fn with_packer(mut self, packer: Arc<dyn Packer>) -> Self {
        self.packer = packer;
        self
    }

    /// Set the payload codec used by [`Context::bind`] and
    /// [`Context::set_response_message`]
    pub fn with_codec(mut self, codec: SerializationFormat) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Register `handler` for `id`; see [`Router::add_route`]
    pub fn add_route<H, I>(&mut self, id: MessageId, handler: H, middlewares: I)
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
        I: IntoIterator<Item = MiddlewareFunc>,
    {
        self.router.add_route(id, handler, middlewares);
    }

    /// Register global middlewares
    pub fn use_middleware<I>(&mut self, middlewares: I)
    where
        I: IntoIterator<Item = MiddlewareFunc>,
    {
        self.router.use_middleware(middlewares);
    }

    pub fn not_found_handler<H>(&mut self, handler: H)
    where
        H: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.router.set_not_found_handler(handler);
    }

    /// Hook run on its own task after a session is registered
    pub fn on_session_create<F>(&mut self, hook: F)
    where
        F: Fn(Arc<Session>) + Send + Sync + 'static,
    {
        self.on_session_create = Some(Arc::new(hook));
    }

    /// Hook run on its own task after a session has fully closed and been unregistered
    pub fn on_session_close<F>(&mut self, hook: F)
    where
        F: Fn(Arc<Session>) + Send + Sync + 'static,
    {
        self.on_session_close = Some(Arc::new(hook));
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Address the server is listening on, once serving
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.is_cancelled()
    }

    /// Bind `addr` and serve until stopped or a non-transient accept error.
    ///
    /// An unparsable address is a [`ProtocolError::ConfigError`]; after [`Server::stop`]
    /// this returns [`ProtocolError::ServerStopped`].
    pub async fn serve(&self, addr: &str) -> Result<()> {
        let addr: SocketAddr = addr.parse().map_err(|e| {
            ProtocolError::ConfigError(format!("Invalid listen address '{addr}': {e}"))
        })?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_listener(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_listener(&self, listener: TcpListener) -> Result<()> {
        if self.serving.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::ConfigError("Server is already serving".to_string()));
        }
        if self.is_stopped() {
            return Err(ProtocolError::ServerStopped);
        }

        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        if self.config.print_routes {
            self.router.print_routes(&format!("tcp://{addr}"));
        }

        let (req_tx, req_rx) = mpsc::channel(self.config.effective_req_queue_size());
        let table = Arc::new(self.router.compile());
        tokio::spawn(consume_requests(table, req_rx, self.router_stop.clone()));

        info!(address = %addr, packer = self.packer.name(), "Server listening");
        self.accept_loop(listener, req_tx).await
    }

    async fn accept_loop(
        &self,
        listener: TcpListener,
        req_tx: mpsc::Sender<Context>,
    ) -> Result<()> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.listener_stop.cancelled() => {
                    trace!("Accept loop stopped");
                    return Err(ProtocolError::ServerStopped);
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = self.apply_socket_options(&stream) {
                        warn!(
                            %peer,
                            error = %e,
                            "Failed to apply socket options, dropping connection"
                        );
                        continue;
                    }
                    self.handle_conn(stream, peer, req_tx.clone());
                }
                Err(e) if is_transient(&e) => {
                    warn!(error = %e, retry_in = ?ACCEPT_RETRY_DELAY, "Transient accept error");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
                Err(e) => {
                    if self.is_stopped() {
                        return Err(ProtocolError::ServerStopped);
                    }
                    error!(error = %e, "Accept failed");
                    return Err(ProtocolError::Io(e));
                }
            }
        }
    }

    fn apply_socket_options(&self, stream: &TcpStream) -> io::Result<()> {
        let socket = socket2::SockRef::from(stream);
        if self.transport.socket_read_buffer_size > 0 {
            socket.set_recv_buffer_size(self.transport.socket_read_buffer_size)?;
        }
        if self.transport.socket_write_buffer_size > 0 {
            socket.set_send_buffer_size(self.transport.socket_write_buffer_size)?;
        }
        stream.set_nodelay(!self.transport.socket_send_delay)
    }

    #[instrument(skip(self, stream, req_tx))]
    fn handle_conn(&self, stream: TcpStream, peer: SocketAddr, req_tx: mpsc::Sender<Context>) {
        let session = Session::new(
            Arc::clone(&self.packer),
            self.codec,
            self.config.effective_resp_queue_size(),
            Some(peer),
        );
        self.sessions.add(Arc::clone(&session));
        global_metrics().session_opened();
        debug!(session_id = session.id(), "Session created");

        // Stop may have snapshotted the registry before this session was added.
        if self.is_stopped() {
            session.close();
        }

        if let Some(hook) = &self.on_session_create {
            let hook = Arc::clone(hook);
            let session = Arc::clone(&session);
            tokio::spawn(async move { hook(session) });
        }

        let (reader, writer) = stream.into_split();
        let inbound = tokio::spawn(Arc::clone(&session).read_inbound(
            reader,
            req_tx,
            self.config.read_timeout,
        ));
        let outbound = tokio::spawn(Arc::clone(&session).write_outbound(
            writer,
            self.config.write_timeout,
            self.config.effective_write_attempts(),
        ));

        let sessions = self.sessions.clone();
        let on_close = self.on_session_close.clone();
        tokio::spawn(async move {
            session.closed().await;
            if let Err(e) = inbound.await {
                error!(session_id = session.id(), error = %e, "Inbound task failed");
            }
            if let Err(e) = outbound.await {
                error!(session_id = session.id(), error = %e, "Outbound task failed");
            }

            global_metrics().session_closed();
            sessions.remove_session(&session);
            debug!(session_id = session.id(), "Session removed");

            if let Some(hook) = on_close {
                tokio::spawn(async move { hook(session) });
            }
        });
    }

    /// Stop the server: close every session, stop the router, then close the listener.
    ///
    /// Returns once all sessions are instructed to close and the router takes no new
    /// work; in-flight handler execution is not waited for. Later calls are no-ops.
    pub fn stop(&self) {
        if self.stop_started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stopped.cancel();

        let sessions = self.sessions.snapshot();
        let closed = sessions.iter().filter(|s| s.close()).count();
        debug!(closed, "Sessions closed");

        self.router_stop.cancel();
        self.listener_stop.cancel();
        info!("Server stopped");
    }
}

/// Accept errors worth retrying after a short delay
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
