//! # Sessions
//!
//! A [`Session`] owns one live connection. Two tasks run for its whole open lifetime:
//!
//! - **inbound** ([`Session::read_inbound`]): reads one packet at a time, wraps it in a
//!   [`Context`] bound to this session and pushes it onto the router's shared request
//!   queue, waiting while that queue is full.
//! - **outbound** ([`Session::write_outbound`]): drains the session's private response
//!   queue, frames each entry and writes it back to the peer.
//!
//! Either task failing closes the session; closing is idempotent and wakes every
//! waiter on [`Session::closed`]. Each task drops its half of the connection when it
//! exits, so the socket is released once both have observed the close.

use bytes::BytesMut;
use futures::StreamExt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, trace, warn};

use crate::core::codec::PacketCodec;
use crate::core::message::Entry;
use crate::core::packet::Packer;
use crate::core::serialization::SerializationFormat;
use crate::error::{ProtocolError, Result};
use crate::protocol::context::Context;
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::maybe_timeout;

/// Identifier of a session, unique per process unless overwritten by the application
pub type SessionId = u64;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)
}

/// One live connection and its response queue.
pub struct Session {
    id: AtomicU64,
    peer_addr: Option<SocketAddr>,
    packer: Arc<dyn Packer>,
    codec: Option<SerializationFormat>,
    resp_tx: mpsc::Sender<Entry>,
    resp_rx: Mutex<Option<mpsc::Receiver<Entry>>>,
    closed: CancellationToken,
    close_started: AtomicBool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Create a session with a fresh numeric id and a response queue of
    /// `resp_queue_size` entries.
    pub fn new(
        packer: Arc<dyn Packer>,
        codec: Option<SerializationFormat>,
        resp_queue_size: usize,
        peer_addr: Option<SocketAddr>,
    ) -> Arc<Self> {
        let (resp_tx, resp_rx) = mpsc::channel(resp_queue_size.max(1));
        Arc::new(Self {
            id: AtomicU64::new(next_session_id()),
            peer_addr,
            packer,
            codec,
            resp_tx,
            resp_rx: Mutex::new(Some(resp_rx)),
            closed: CancellationToken::new(),
            close_started: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id.load(Ordering::Acquire)
    }

    /// Overwrite the session id.
    ///
    /// Call this before the session is shared with other tasks. A session that is
    /// already registered must be re-keyed through
    /// [`SessionRegistry::rekey`](crate::transport::registry::SessionRegistry::rekey)
    /// instead, or lookups by the new id will miss it.
    pub fn set_id(&self, id: SessionId) {
        self.id.store(id, Ordering::Release);
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    pub fn packer(&self) -> &Arc<dyn Packer> {
        &self.packer
    }

    pub fn codec(&self) -> Option<SerializationFormat> {
        self.codec
    }

    /// A context with no request, bound to this session, for server-initiated pushes.
    pub fn allocate_context(self: &Arc<Self>) -> Context {
        Context::allocate(Arc::clone(self))
    }

    /// Post `entry` onto the response queue.
    ///
    /// Waits while the queue is full. Fails with [`ProtocolError::SessionClosed`] once
    /// the session is closed, including when it closes during the wait.
    pub async fn send(&self, entry: Entry) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::SessionClosed);
        }
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(ProtocolError::SessionClosed),
            sent = self.resp_tx.send(entry) => sent.map_err(|_| ProtocolError::SessionClosed),
        }
    }

    /// Start the close sequence. Returns `true` for the call that actually closed the
    /// session; every later call is a no-op returning `false`.
    pub fn close(&self) -> bool {
        if self.close_started.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.closed.cancel();
        debug!(session_id = self.id(), "Session closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    fn take_response_queue(&self) -> Option<mpsc::Receiver<Entry>> {
        match self.resp_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    #[cfg(test)]
    #[allow(clippy::expect_used)]
    pub(crate) fn take_response_queue_for_test(&self) -> mpsc::Receiver<Entry> {
        self.take_response_queue()
            .expect("response queue already taken")
    }

    /// Inbound task: read packets until EOF, a framing/I/O error, a read timeout, or
    /// close. Always closes the session on exit.
    #[instrument(skip_all, fields(session_id = self.id()))]
    pub async fn read_inbound<R>(
        self: Arc<Self>,
        reader: R,
        req_queue: mpsc::Sender<Context>,
        read_timeout: Duration,
    ) where
        R: AsyncRead + Unpin,
    {
        let metrics = global_metrics();
        let mut frames = FramedRead::new(reader, PacketCodec::new(Arc::clone(&self.packer)));

        loop {
            let next = tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                next = maybe_timeout(
                    async { frames.next().await.transpose() },
                    read_timeout,
                ) => next,
            };

            let entry = match next {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    debug!("Peer closed connection");
                    break;
                }
                Err(e) => {
                    if e.is_framing() {
                        metrics.framing_error();
                        warn!(error = %e, "Framing error, dropping connection");
                    } else {
                        debug!(error = %e, "Inbound read failed");
                    }
                    break;
                }
            };

            metrics.message_received(entry.len() as u64);
            trace!(id = entry.id, len = entry.len(), "Entry received");

            let ctx = Context::new(entry, Arc::clone(&self));
            tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                sent = req_queue.send(ctx) => {
                    if sent.is_err() {
                        debug!("Router queue closed");
                        break;
                    }
                }
            }
        }

        self.close();
    }

    /// Outbound task: write queued responses until the session closes or a write fails
    /// after `write_attempts` attempts. Always closes the session on exit.
    #[instrument(skip_all, fields(session_id = self.id()))]
    pub async fn write_outbound<W>(
        self: Arc<Self>,
        mut writer: W,
        write_timeout: Duration,
        write_attempts: usize,
    ) where
        W: AsyncWrite + Unpin,
    {
        let Some(mut responses) = self.take_response_queue() else {
            error!("Outbound task already started for this session");
            return;
        };
        let metrics = global_metrics();
        let attempts = write_attempts.max(1);
        let mut buf = BytesMut::new();

        loop {
            let entry = tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                entry = responses.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            buf.clear();
            if let Err(e) = self.packer.pack(&entry, &mut buf) {
                error!(id = entry.id, error = %e, "Failed to pack response, skipping");
                continue;
            }

            let written = tokio::select! {
                biased;
                _ = self.closed.cancelled() => break,
                written = write_packet(&mut writer, &buf, write_timeout, attempts) => written,
            };

            match written {
                Ok(()) => {
                    metrics.message_sent(buf.len() as u64);
                    trace!(id = entry.id, bytes = buf.len(), "Entry written");
                }
                Err(e) => {
                    metrics.write_failure();
                    warn!(error = %e, attempts, "Write failed, dropping connection");
                    break;
                }
            }
        }

        self.close();
    }
}

/// Write one framed packet, retrying only when an attempt hits the write timeout.
///
/// Bytes accepted by an earlier attempt are never written again; a retry resumes at the
/// first unwritten byte so the peer sees the frame exactly once.
async fn write_packet<W>(
    writer: &mut W,
    packet: &[u8],
    timeout: Duration,
    attempts: usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = maybe_timeout(
            async {
                while written < packet.len() {
                    let n = writer.write(&packet[written..]).await?;
                    if n == 0 {
                        return Err(ProtocolError::Io(io::ErrorKind::WriteZero.into()));
                    }
                    written += n;
                }
                writer.flush().await?;
                Ok::<(), ProtocolError>(())
            },
            timeout,
        )
        .await;

        match result {
            Err(ProtocolError::Timeout) if attempt < attempts => {
                debug!(attempt, written, total = packet.len(), "Write timed out, retrying");
            }
            other => return other,
        }
    }
}
