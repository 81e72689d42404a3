//! Connector role
//!
//! One outbound connection attempt to one peer. There is no retry: a failed
//! attempt is terminal and reported once.

use std::io;
use std::time::Duration;

use bluchat_core::{LinkError, PeerIdentity, ServiceRecord};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{classify, SharedBackend, Transport};
use crate::cancel::CancelToken;
use crate::signal::{AttemptId, LinkSignal, SignalSender};

/// A running outbound connect worker
#[derive(Debug)]
pub struct Connector {
    attempt: AttemptId,
    peer: PeerIdentity,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

impl Connector {
    /// Spawn the connect worker. Must be called inside a tokio runtime.
    pub fn start(
        backend: SharedBackend,
        service: ServiceRecord,
        peer: PeerIdentity,
        connect_timeout: Option<Duration>,
        attempt: AttemptId,
        signals: SignalSender,
    ) -> Self {
        let cancel = CancelToken::new();
        let worker = tokio::spawn(run_connector(
            backend,
            service,
            peer.clone(),
            connect_timeout,
            attempt,
            cancel.clone(),
            signals,
        ));
        Self {
            attempt,
            peer,
            cancel,
            worker,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    /// Close the connecting socket; an in-flight connect fails promptly. Idempotent.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            debug!("Connector {} to {} cancelled", self.attempt, self.peer);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker to exit
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            if e.is_panic() {
                error!("Connector {} worker panicked", self.attempt);
            }
        }
    }
}

async fn connect_once(
    backend: &SharedBackend,
    service: &ServiceRecord,
    peer: &PeerIdentity,
    connect_timeout: Option<Duration>,
) -> io::Result<Transport> {
    let connect = backend.connect(peer, service);
    let stream = match connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connect).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no answer within {}ms", limit.as_millis()),
            )
        })??,
        None => connect.await?,
    };
    Ok(Transport::from_boxed(stream, peer.clone()))
}

async fn run_connector(
    backend: SharedBackend,
    service: ServiceRecord,
    peer: PeerIdentity,
    connect_timeout: Option<Duration>,
    attempt: AttemptId,
    cancel: CancelToken,
    signals: SignalSender,
) {
    info!("Connector {} attempting to connect to {}", attempt, peer);

    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        result = connect_once(&backend, &service, &peer, connect_timeout) => result,
    };

    let signal = match result {
        Ok(transport) => {
            info!("Connector {} connected to {}", attempt, peer);
            LinkSignal::Established { attempt, transport }
        }
        Err(e) => {
            warn!("Connector {} could not connect to {}: {}", attempt, peer, e);
            LinkSignal::AttemptFailed {
                attempt,
                error: classify(&e, LinkError::connect),
            }
        }
    };

    if signals.send(signal).is_err() {
        debug!("Connector {} finished after coordinator stopped", attempt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryHub;
    use crate::signal::create_signal_channel;
    use bluchat_core::LinkErrorKind;
    use std::sync::Arc;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_refused_connect_is_terminal() {
        let hub = MemoryHub::new();
        let client = Arc::new(hub.device("client", "Client"));
        let (tx, mut rx) = create_signal_channel();

        let connector = Connector::start(
            client,
            ServiceRecord::default(),
            PeerIdentity::new("nobody", "Nobody"),
            None,
            AttemptId(3),
            tx,
        );

        match rx.recv().await.unwrap() {
            LinkSignal::AttemptFailed { attempt, error } => {
                assert_eq!(attempt, AttemptId(3));
                assert_eq!(error.kind(), LinkErrorKind::ConnectFailed);
            }
            other => panic!("unexpected signal: {other:?}"),
        }
        connector.join().await;
        assert_eq!(hub.stats().open_streams(), 0);
    }

    #[tokio::test]
    async fn test_cancel_unblocks_stalled_connect() {
        let hub = MemoryHub::new();
        hub.stall("slow");
        let client = Arc::new(hub.device("client", "Client"));
        let (tx, mut rx) = create_signal_channel();

        let connector = Connector::start(
            client,
            ServiceRecord::default(),
            PeerIdentity::new("slow", "Slow"),
            None,
            AttemptId(1),
            tx,
        );

        timeout(Duration::from_secs(1), async {
            while hub.stats().streams_opened == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("connect should start");

        connector.cancel();
        timeout(Duration::from_secs(1), connector.join())
            .await
            .expect("connect should unblock on cancel");

        assert_eq!(hub.stats().open_streams(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_timeout_reports_connect_failed() {
        let hub = MemoryHub::new();
        hub.stall("slow");
        let client = Arc::new(hub.device("client", "Client"));
        let (tx, mut rx) = create_signal_channel();

        let _connector = Connector::start(
            client,
            ServiceRecord::default(),
            PeerIdentity::new("slow", "Slow"),
            Some(Duration::from_millis(20)),
            AttemptId(1),
            tx,
        );

        match timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap() {
            LinkSignal::AttemptFailed { error, .. } => {
                assert_eq!(error.kind(), LinkErrorKind::ConnectFailed);
            }
            other => panic!("unexpected signal: {other:?}"),
        }
    }
}
