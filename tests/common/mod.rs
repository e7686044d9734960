#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tcp_router::config::{ServerConfig, TransportConfig};
use tcp_router::error::Result;
use tcp_router::service::server::Server;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub fn test_server() -> Server {
    let config = ServerConfig {
        print_routes: false,
        ..ServerConfig::default()
    };
    Server::new(config, TransportConfig::default())
}

/// Serve on an ephemeral local port
pub async fn start(server: Server) -> (Arc<Server>, SocketAddr, JoinHandle<Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(server);
    let serving = Arc::clone(&server);
    let handle = tokio::spawn(async move { serving.serve_listener(listener).await });
    (server, addr, handle)
}

/// Poll `cond` until it holds, failing after two seconds
pub async fn wait_until<F>(mut cond: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
