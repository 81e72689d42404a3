//! Listener role
//!
//! Binds an endpoint under the service record, accepts exactly one inbound
//! connection and hands it to the coordinator. The endpoint is released as
//! soon as that connection is in hand; accepting another one needs a new
//! listener.

use bluchat_core::{LinkError, ServiceRecord};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{classify, SharedBackend};
use crate::cancel::CancelToken;
use crate::signal::{AttemptId, LinkSignal, SignalSender};

/// A running single-shot accept worker
#[derive(Debug)]
pub struct Listener {
    attempt: AttemptId,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

impl Listener {
    /// Spawn the bind+accept worker. Must be called inside a tokio runtime.
    pub fn start(
        backend: SharedBackend,
        service: ServiceRecord,
        attempt: AttemptId,
        signals: SignalSender,
    ) -> Self {
        let cancel = CancelToken::new();
        let worker = tokio::spawn(run_listener(
            backend,
            service,
            attempt,
            cancel.clone(),
            signals,
        ));
        Self {
            attempt,
            cancel,
            worker,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Close the endpoint; a pending accept fails promptly. Safe to call repeatedly.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            debug!("Listener {} cancelled", self.attempt);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker to exit
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            if e.is_panic() {
                error!("Listener {} worker panicked", self.attempt);
            }
        }
    }
}

async fn run_listener(
    backend: SharedBackend,
    service: ServiceRecord,
    attempt: AttemptId,
    cancel: CancelToken,
    signals: SignalSender,
) {
    let bound = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        bound = backend.bind(&service) => bound,
    };

    let mut endpoint = match bound {
        Ok(endpoint) => endpoint,
        Err(e) => {
            warn!("Listener {} could not bind {}: {}", attempt, service, e);
            let _ = signals.send(LinkSignal::AttemptFailed {
                attempt,
                error: LinkError::bind(&e),
            });
            return;
        }
    };

    info!(
        "Listener {} waiting for connections on {} via {}",
        attempt,
        endpoint.local_address().as_deref().unwrap_or("<unknown>"),
        backend.name()
    );

    let accepted = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Listener {} closing endpoint", attempt);
            return;
        }
        accepted = endpoint.accept() => accepted,
    };

    // Single-shot: release the endpoint before handing the connection over.
    drop(endpoint);

    let signal = match accepted {
        Ok(transport) => {
            info!("Listener {} accepted {}", attempt, transport.peer());
            LinkSignal::Established { attempt, transport }
        }
        Err(e) => {
            warn!("Listener {} accept failed: {}", attempt, e);
            LinkSignal::AttemptFailed {
                attempt,
                error: classify(&e, LinkError::accept),
            }
        }
    };

    if signals.send(signal).is_err() {
        debug!("Listener {} finished after coordinator stopped", attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LinkBackend;
    use crate::memory::MemoryHub;
    use crate::signal::create_signal_channel;
    use bluchat_core::{LinkErrorKind, PeerIdentity};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn wait_until_bound(hub: &MemoryHub, address: &str, service: &ServiceRecord) {
        timeout(Duration::from_secs(1), async {
            while !hub.is_bound(address, service) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("listener should bind");
    }

    #[tokio::test]
    async fn test_accepts_once_then_releases_endpoint() {
        let hub = MemoryHub::new();
        let server = Arc::new(hub.device("server", "Server"));
        let client = hub.device("client", "Client");
        let service = ServiceRecord::default();
        let (tx, mut rx) = create_signal_channel();

        let listener = Listener::start(server, service.clone(), AttemptId(1), tx);
        wait_until_bound(&hub, "server", &service).await;

        let _stream = client
            .connect(&PeerIdentity::new("server", "Server"), &service)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            LinkSignal::Established { attempt, transport } => {
                assert_eq!(attempt, AttemptId(1));
                assert_eq!(transport.peer().label(), "Client");
            }
            other => panic!("unexpected signal: {other:?}"),
        }

        listener.join().await;
        assert!(!hub.is_bound("server", &service));
        assert_eq!(hub.stats().open_endpoints(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_accept_without_signal() {
        let hub = MemoryHub::new();
        let server = Arc::new(hub.device("server", "Server"));
        let service = ServiceRecord::default();
        let (tx, mut rx) = create_signal_channel();

        let listener = Listener::start(server, service.clone(), AttemptId(7), tx);
        wait_until_bound(&hub, "server", &service).await;

        listener.cancel();
        listener.cancel();
        timeout(Duration::from_secs(1), listener.join())
            .await
            .expect("accept should unblock on cancel");

        let stats = hub.stats();
        assert_eq!(stats.endpoints_opened, 1);
        assert_eq!(stats.endpoints_closed, 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let hub = MemoryHub::new();
        let service = ServiceRecord::default();
        let first = Arc::new(hub.device("server", "Server"));
        let (tx, mut rx) = create_signal_channel();

        let holder = Listener::start(first.clone(), service.clone(), AttemptId(1), tx.clone());
        wait_until_bound(&hub, "server", &service).await;

        let _second = Listener::start(first, service, AttemptId(2), tx);
        match rx.recv().await.unwrap() {
            LinkSignal::AttemptFailed { attempt, error } => {
                assert_eq!(attempt, AttemptId(2));
                assert_eq!(error.kind(), LinkErrorKind::BindFailed);
            }
            other => panic!("unexpected signal: {other:?}"),
        }

        holder.cancel();
        holder.join().await;
    }
}
