//! TCP link backend
//!
//! Stands in for the radio on machines without one. Addresses are
//! `host:port`; there is no service discovery, so the service record only
//! shows up in logs.

use std::io;

use async_trait::async_trait;
use bluchat_core::{PeerIdentity, ServiceRecord};
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::backend::{stream_setup_failed, BoxedStream, LinkBackend, LinkEndpoint, Transport};

#[derive(Debug, Clone)]
pub struct TcpLink {
    bind_address: String,
}

impl TcpLink {
    /// Backend whose endpoints bind to `bind_address` (e.g. `0.0.0.0:4410`)
    pub fn new(bind_address: impl Into<String>) -> Self {
        Self {
            bind_address: bind_address.into(),
        }
    }

    pub fn bind_address(&self) -> &str {
        &self.bind_address
    }
}

#[async_trait]
impl LinkBackend for TcpLink {
    fn name(&self) -> &'static str {
        "tcp"
    }

    async fn bind(&self, service: &ServiceRecord) -> io::Result<Box<dyn LinkEndpoint>> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        debug!(
            "TCP endpoint for {} bound on {}",
            service,
            listener.local_addr()?
        );
        Ok(Box::new(TcpEndpoint { listener }))
    }

    async fn connect(
        &self,
        peer: &PeerIdentity,
        _service: &ServiceRecord,
    ) -> io::Result<BoxedStream> {
        let stream = TcpStream::connect(peer.address()).await?;
        stream.set_nodelay(true).map_err(stream_setup_failed)?;
        Ok(Box::new(stream))
    }
}

struct TcpEndpoint {
    listener: TcpListener,
}

#[async_trait]
impl LinkEndpoint for TcpEndpoint {
    async fn accept(&mut self) -> io::Result<Transport> {
        let (stream, remote) = self.listener.accept().await?;
        stream.set_nodelay(true).map_err(stream_setup_failed)?;
        Ok(Transport::new(stream, PeerIdentity::unnamed(remote.to_string())))
    }

    fn local_address(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|addr| addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_bind_accept_connect() {
        let link = TcpLink::new("127.0.0.1:0");
        let service = ServiceRecord::default();
        let mut endpoint = link.bind(&service).await.unwrap();
        let address = endpoint.local_address().unwrap();

        let client = {
            let link = link.clone();
            let service = service.clone();
            tokio::spawn(async move {
                link.connect(&PeerIdentity::unnamed(address), &service)
                    .await
                    .unwrap()
            })
        };

        let accepted = endpoint.accept().await.unwrap();
        let mut client = client.await.unwrap();
        client.write_all(b"ping").await.unwrap();

        let (mut server, peer) = accepted.into_parts();
        assert!(peer.address().starts_with("127.0.0.1:"));
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Reserve a port, then release it so nothing listens there.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let link = TcpLink::new("127.0.0.1:0");
        let result = link
            .connect(
                &PeerIdentity::unnamed(format!("127.0.0.1:{port}")),
                &ServiceRecord::default(),
            )
            .await;
        assert!(result.is_err());
    }
}
