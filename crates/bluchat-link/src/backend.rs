//! Link backend abstraction

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bluchat_core::{LinkError, PeerIdentity, ServiceRecord};
use tokio::io::{AsyncRead, AsyncWrite};

// ----------------------------------------------------------------------------
// Streams and Transports
// ----------------------------------------------------------------------------

/// Bidirectional byte stream of an established link
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

pub type BoxedStream = Box<dyn LinkStream>;

/// An established stream together with the identity of its far end.
///
/// Owned by exactly one component at a time: a role produces it, the
/// coordinator moves it into a session, dropping it closes the stream.
pub struct Transport {
    stream: BoxedStream,
    peer: PeerIdentity,
}

impl Transport {
    pub fn new(stream: impl LinkStream + 'static, peer: PeerIdentity) -> Self {
        Self::from_boxed(Box::new(stream), peer)
    }

    pub fn from_boxed(stream: BoxedStream, peer: PeerIdentity) -> Self {
        Self { stream, peer }
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    pub fn into_parts(self) -> (BoxedStream, PeerIdentity) {
        (self.stream, self.peer)
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").field("peer", &self.peer).finish()
    }
}

// ----------------------------------------------------------------------------
// Stream Setup Failures
// ----------------------------------------------------------------------------

/// An error raised while preparing the byte stream of a connection that was
/// already accepted or established
#[derive(Debug)]
pub struct StreamSetupError(io::Error);

impl fmt::Display for StreamSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for StreamSetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Tag `err` so roles report it as `StreamSetupFailed`
pub fn stream_setup_failed(err: io::Error) -> io::Error {
    io::Error::new(err.kind(), StreamSetupError(err))
}

/// Map a backend error to a [`LinkError`], honouring stream setup tags
pub(crate) fn classify(err: &io::Error, otherwise: fn(&io::Error) -> LinkError) -> LinkError {
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<StreamSetupError>())
    {
        Some(setup) => LinkError::StreamSetupFailed {
            reason: setup.to_string(),
        },
        None => otherwise(err),
    }
}

// ----------------------------------------------------------------------------
// Backend Traits
// ----------------------------------------------------------------------------

/// A bound, advertised endpoint. Dropping it releases the endpoint.
#[async_trait]
pub trait LinkEndpoint: Send {
    /// Wait for one inbound connection
    async fn accept(&mut self) -> io::Result<Transport>;

    /// Address the endpoint is reachable at, when the backend knows it
    fn local_address(&self) -> Option<String> {
        None
    }
}

/// A connection-oriented link technology (RFCOMM, TCP, in-memory)
#[async_trait]
pub trait LinkBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Bind and advertise an endpoint under `service`
    async fn bind(&self, service: &ServiceRecord) -> io::Result<Box<dyn LinkEndpoint>>;

    /// One outbound connection attempt to `peer` under `service`
    async fn connect(&self, peer: &PeerIdentity, service: &ServiceRecord)
        -> io::Result<BoxedStream>;
}

pub type SharedBackend = Arc<dyn LinkBackend>;
