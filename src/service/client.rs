use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::core::codec::PacketCodec;
use crate::core::message::Entry;
use crate::core::packet::{DefaultPacker, Packer};
use crate::error::{ProtocolError, Result};
use crate::utils::timeout::{maybe_timeout, with_timeout_error};

/// Framed TCP client speaking the same packet format as the server
pub struct Client {
    framed: Framed<TcpStream, PacketCodec>,
    response_timeout: Duration,
}

impl Client {
    /// Connect with the default client configuration and packer
    pub async fn connect(addr: &str) -> Result<Self> {
        let config = ClientConfig {
            address: addr.to_string(),
            ..ClientConfig::default()
        };
        Self::connect_with_config(&config, Arc::new(DefaultPacker::new())).await
    }

    #[instrument(skip(config, packer), fields(address = %config.address))]
    pub async fn connect_with_config(
        config: &ClientConfig,
        packer: Arc<dyn Packer>,
    ) -> Result<Self> {
        let stream = with_timeout_error(
            async { TcpStream::connect(&config.address).await.map_err(ProtocolError::from) },
            config.connection_timeout,
        )
        .await?;
        stream.set_nodelay(true)?;
        debug!("Connected");

        Ok(Self {
            framed: Framed::new(stream, PacketCodec::new(packer)),
            response_timeout: config.response_timeout,
        })
    }

    pub async fn send(&mut self, entry: Entry) -> Result<()> {
        self.framed.send(entry).await
    }

    /// Wait for the next entry; a zero response timeout waits indefinitely
    pub async fn receive(&mut self) -> Result<Entry> {
        let framed = &mut self.framed;
        maybe_timeout(
            async {
                match framed.next().await {
                    Some(result) => result,
                    None => Err(ProtocolError::ConnectionClosed),
                }
            },
            self.response_timeout,
        )
        .await
    }

    /// Send a message and wait for a response
    pub async fn request(&mut self, entry: Entry) -> Result<Entry> {
        self.send(entry).await?;
        self.receive().await
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().local_addr()?)
    }
}
