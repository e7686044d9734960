//! Example: Broadcast Server
//!
//! Every broadcast request is fanned out to all other connected sessions, and the
//! sender receives an acknowledgement. Connected sessions are tracked by the
//! application through the session lifecycle hooks.
//!
//! Run with: `cargo run --example broadcast_server`

use dashmap::DashMap;
use std::sync::Arc;
use tcp_router::config::NetworkConfig;
use tcp_router::core::message::Entry;
use tcp_router::protocol::context::Context;
use tcp_router::protocol::middleware::{log_requests, recover};
use tcp_router::service::server::Server;
use tcp_router::transport::session::{Session, SessionId};
use tcp_router::utils::logging::init_logging;
use tracing::{error, info};

const BROADCAST_REQ: u32 = 1;
const BROADCAST_ACK: u32 = 2;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = NetworkConfig::from_env()?;
    config.validate_strict()?;
    init_logging(&config.logging)?;

    let sessions: Arc<DashMap<SessionId, Arc<Session>>> = Arc::new(DashMap::new());
    let mut server = Server::from_config(&config);

    {
        let sessions = Arc::clone(&sessions);
        server.on_session_create(move |session| {
            sessions.insert(session.id(), session);
        });
    }
    {
        let sessions = Arc::clone(&sessions);
        server.on_session_close(move |session| {
            sessions.remove(&session.id());
        });
    }

    server.use_middleware([recover(), log_requests()]);

    {
        let sessions = Arc::clone(&sessions);
        server.add_route(
            BROADCAST_REQ,
            move |ctx: &mut Context| {
                let data = ctx.request().map(|r| r.data.clone()).unwrap_or_default();
                let from = ctx.session().id();

                for entry in sessions.iter() {
                    let to = *entry.key();
                    if to == from {
                        continue;
                    }
                    let text = format!(
                        "{} (broadcast from {from} to {to})",
                        String::from_utf8_lossy(&data)
                    );
                    let push = entry
                        .value()
                        .allocate_context()
                        .with_response(Entry::new(BROADCAST_ACK, text));
                    tokio::spawn(async move {
                        if let Err(e) = push.send().await {
                            error!(session_id = to, error = %e, "Broadcast push failed");
                        }
                    });
                }

                ctx.set_response(Entry::new(BROADCAST_ACK, &b"broadcast done"[..]));
            },
            [],
        );
    }

    let server = Arc::new(server);
    let serving = {
        let server = Arc::clone(&server);
        let addr = config.server.address.clone();
        tokio::spawn(async move { server.serve(&addr).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop();

    match serving.await? {
        Ok(()) => {}
        Err(e) => info!(reason = %e, "Server exited"),
    }
    Ok(())
}
