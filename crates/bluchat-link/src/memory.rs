//! In-process link backend
//!
//! A [`MemoryHub`] is a tiny radio neighbourhood: every [`MemoryLink`] created
//! from it is one addressed device, and streams between devices are
//! `tokio::io::duplex` pipes. The hub counts every endpoint and stream it
//! opens and every one that gets dropped, which lets tests assert that
//! each resource is released exactly once.

use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bluchat_core::{PeerIdentity, ServiceRecord};
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::backend::{BoxedStream, LinkBackend, LinkEndpoint, Transport};

const PIPE_CAPACITY: usize = 64 * 1024;
const ACCEPT_BACKLOG: usize = 4;

type EndpointKey = (String, Uuid);

// ----------------------------------------------------------------------------
// Resource Accounting
// ----------------------------------------------------------------------------

/// Snapshot of the hub's resource counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    pub endpoints_opened: usize,
    pub endpoints_closed: usize,
    pub streams_opened: usize,
    pub streams_closed: usize,
}

impl HubStats {
    pub fn open_endpoints(&self) -> usize {
        self.endpoints_opened - self.endpoints_closed
    }

    /// Stream ends currently alive, counting both sides of a connection
    pub fn open_streams(&self) -> usize {
        self.streams_opened - self.streams_closed
    }
}

#[derive(Debug, Default)]
struct Counters {
    endpoints_opened: AtomicUsize,
    endpoints_closed: AtomicUsize,
    streams_opened: AtomicUsize,
    streams_closed: AtomicUsize,
}

/// Increments `streams_closed` exactly once, when the owning stream is dropped
#[derive(Debug)]
struct StreamGuard {
    counters: Arc<Counters>,
}

impl StreamGuard {
    fn open(counters: &Arc<Counters>) -> Self {
        counters.streams_opened.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.counters.streams_closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Hub
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct HubInner {
    endpoints: Mutex<HashMap<EndpointKey, mpsc::Sender<Transport>>>,
    stalled: Mutex<HashSet<String>>,
    counters: Arc<Counters>,
}

impl HubInner {
    fn endpoints(&self) -> MutexGuard<'_, HashMap<EndpointKey, mpsc::Sender<Transport>>> {
        self.endpoints.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stalled(&self, address: &str) -> bool {
        self.stalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }
}

/// Shared registry of in-process devices
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    inner: Arc<HubInner>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A device on this hub reachable at `address`
    pub fn device(&self, address: impl Into<String>, label: impl Into<String>) -> MemoryLink {
        MemoryLink {
            hub: self.clone(),
            identity: PeerIdentity::new(address, label),
        }
    }

    /// Make connects to `address` hang until cancelled
    pub fn stall(&self, address: impl Into<String>) {
        self.inner
            .stalled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into());
    }

    pub fn stats(&self) -> HubStats {
        let counters = &self.inner.counters;
        HubStats {
            endpoints_opened: counters.endpoints_opened.load(Ordering::SeqCst),
            endpoints_closed: counters.endpoints_closed.load(Ordering::SeqCst),
            streams_opened: counters.streams_opened.load(Ordering::SeqCst),
            streams_closed: counters.streams_closed.load(Ordering::SeqCst),
        }
    }

    /// Whether an endpoint is currently bound at `address` for `service`
    pub fn is_bound(&self, address: &str, service: &ServiceRecord) -> bool {
        self.inner
            .endpoints()
            .contains_key(&(address.to_string(), service.uuid))
    }
}

// ----------------------------------------------------------------------------
// Device Backend
// ----------------------------------------------------------------------------

/// One addressed device on a [`MemoryHub`]
#[derive(Debug, Clone)]
pub struct MemoryLink {
    hub: MemoryHub,
    identity: PeerIdentity,
}

impl MemoryLink {
    pub fn identity(&self) -> &PeerIdentity {
        &self.identity
    }
}

#[async_trait]
impl LinkBackend for MemoryLink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn bind(&self, service: &ServiceRecord) -> io::Result<Box<dyn LinkEndpoint>> {
        let key = (self.identity.address().to_string(), service.uuid);
        let mut endpoints = self.hub.inner.endpoints();
        if endpoints.get(&key).is_some_and(|sender| !sender.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{} already bound on {}", service, key.0),
            ));
        }

        let (sender, receiver) = mpsc::channel(ACCEPT_BACKLOG);
        endpoints.insert(key.clone(), sender);
        drop(endpoints);

        let counters = Arc::clone(&self.hub.inner.counters);
        counters.endpoints_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryEndpoint {
            hub: self.hub.clone(),
            key,
            incoming: receiver,
        }))
    }

    async fn connect(
        &self,
        peer: &PeerIdentity,
        service: &ServiceRecord,
    ) -> io::Result<BoxedStream> {
        let counters = &self.hub.inner.counters;
        // The connecting socket exists from here on, so a cancelled attempt still closes it.
        let client_guard = StreamGuard::open(counters);

        if self.hub.inner.is_stalled(peer.address()) {
            std::future::pending::<()>().await;
        }
        tokio::task::yield_now().await;

        let sender = self
            .hub
            .inner
            .endpoints()
            .get(&(peer.address().to_string(), service.uuid))
            .cloned()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("nothing listening on {} for {}", peer.address(), service),
                )
            })?;

        let (client, server) = tokio::io::duplex(PIPE_CAPACITY);
        let server = MemoryStream {
            inner: server,
            _guard: StreamGuard::open(counters),
        };
        sender
            .try_send(Transport::new(server, self.identity.clone()))
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "endpoint closed"))?;

        Ok(Box::new(MemoryStream {
            inner: client,
            _guard: client_guard,
        }))
    }
}

struct MemoryEndpoint {
    hub: MemoryHub,
    key: EndpointKey,
    incoming: mpsc::Receiver<Transport>,
}

#[async_trait]
impl LinkEndpoint for MemoryEndpoint {
    async fn accept(&mut self) -> io::Result<Transport> {
        self.incoming
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionAborted, "endpoint closed"))
    }

    fn local_address(&self) -> Option<String> {
        Some(self.key.0.clone())
    }
}

impl Drop for MemoryEndpoint {
    fn drop(&mut self) {
        // Closing first marks our registration dead; queued connections are
        // dropped together with the receiver.
        self.incoming.close();
        let mut endpoints = self.hub.inner.endpoints();
        if endpoints.get(&self.key).is_some_and(|sender| sender.is_closed()) {
            endpoints.remove(&self.key);
        }
        drop(endpoints);
        self.hub
            .inner
            .counters
            .endpoints_closed
            .fetch_add(1, Ordering::SeqCst);
    }
}

// ----------------------------------------------------------------------------
// Streams
// ----------------------------------------------------------------------------

/// One end of an in-memory connection
struct MemoryStream {
    inner: DuplexStream,
    _guard: StreamGuard,
}

impl AsyncRead for MemoryStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
