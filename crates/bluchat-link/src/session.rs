//! Transport session
//!
//! Owns one established transport. The stream is split into its read and
//! write halves; the worker drives a read loop and a write loop side by side
//! and races both against cancellation. A write stuck on a peer that is not
//! reading never holds up reads, and `cancel()` abandons it promptly. Both
//! halves are dropped together when the worker exits, which is the single
//! place the stream is closed.
//!
//! Reads are relayed raw: every successful read becomes one
//! [`LinkSignal::Received`] with exactly the bytes read, no framing applied.
//! End of stream or a read error ends the worker with
//! [`LinkSignal::SessionClosed`].

use bluchat_core::{LinkError, PeerIdentity};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{BoxedStream, Transport};
use crate::cancel::CancelToken;
use crate::signal::{LinkSignal, SessionId, SignalSender};

const WRITE_QUEUE_DEPTH: usize = 8;

struct WriteRequest {
    data: Vec<u8>,
    reply: oneshot::Sender<Result<(), LinkError>>,
}

/// A write queued on a session but not yet settled
#[derive(Debug)]
pub struct PendingWrite {
    outcome: oneshot::Receiver<Result<(), LinkError>>,
}

impl PendingWrite {
    /// The write's result, or `None` if the session closed before it settled
    pub async fn settled(self) -> Option<Result<(), LinkError>> {
        self.outcome.await.ok()
    }
}

/// A running read loop plus write path over one transport
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: PeerIdentity,
    writes: mpsc::Sender<WriteRequest>,
    cancel: CancelToken,
    worker: JoinHandle<()>,
}

impl Session {
    /// Take ownership of `transport` and start its read loop
    pub fn start(
        id: SessionId,
        transport: Transport,
        read_buffer_size: usize,
        signals: SignalSender,
    ) -> Self {
        let (stream, peer) = transport.into_parts();
        let (writes, write_queue) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let cancel = CancelToken::new();
        let worker = tokio::spawn(run_session(
            id,
            stream,
            read_buffer_size.max(1),
            write_queue,
            cancel.clone(),
            signals,
        ));
        info!("Session {} started with {}", id, peer);
        Self {
            id,
            peer,
            writes,
            cancel,
            worker,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &PeerIdentity {
        &self.peer
    }

    /// Queue `data` without waiting for it to reach the stream
    pub fn submit(&self, data: Vec<u8>) -> Result<PendingWrite, LinkError> {
        let (reply, outcome) = oneshot::channel();
        self.writes
            .try_send(WriteRequest { data, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => LinkError::WriteFailed {
                    reason: "write queue full".to_string(),
                },
                mpsc::error::TrySendError::Closed(_) => session_closed(),
            })?;
        Ok(PendingWrite { outcome })
    }

    /// Write and flush `data`, returning once the bytes are on the stream
    pub async fn write(&self, data: Vec<u8>) -> Result<(), LinkError> {
        let pending = self.submit(data)?;
        pending.settled().await.unwrap_or_else(|| Err(session_closed()))
    }

    /// Close the stream; a blocked read or write fails promptly. Idempotent.
    pub fn cancel(&self) {
        if self.cancel.cancel() {
            debug!("Session {} with {} cancelled", self.id, self.peer);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Wait for the worker, and with it the stream, to go away
    pub async fn join(self) {
        if let Err(e) = self.worker.await {
            if e.is_panic() {
                error!("Session {} worker panicked", self.id);
            }
        }
    }
}

/// The error a write reports when its session went away first
pub fn session_closed() -> LinkError {
    LinkError::WriteFailed {
        reason: "session closed".to_string(),
    }
}

async fn write_all(stream: &mut WriteHalf<BoxedStream>, data: &[u8]) -> Result<(), LinkError> {
    stream.write_all(data).await.map_err(|e| LinkError::write(&e))?;
    stream.flush().await.map_err(|e| LinkError::write(&e))
}

/// Serve queued writes in order. Never returns: once every sender is gone
/// the session keeps reading until the peer or a cancel ends it.
async fn write_loop(
    id: SessionId,
    mut writer: WriteHalf<BoxedStream>,
    mut write_queue: mpsc::Receiver<WriteRequest>,
) {
    while let Some(WriteRequest { data, reply }) = write_queue.recv().await {
        let result = write_all(&mut writer, &data).await;
        if let Err(e) = &result {
            warn!("Session {} write failed: {}", id, e);
        }
        let _ = reply.send(result);
    }
    debug!("Session {} write queue closed", id);
    std::future::pending::<()>().await;
}

async fn read_loop(
    id: SessionId,
    mut reader: ReadHalf<BoxedStream>,
    read_buffer_size: usize,
    signals: SignalSender,
) {
    let mut buffer = vec![0u8; read_buffer_size];

    let error = loop {
        match reader.read(&mut buffer).await {
            Ok(0) => {
                break LinkError::ReadFailed {
                    reason: "stream closed by peer".to_string(),
                }
            }
            Ok(n) => {
                debug!("Session {} read {} bytes", id, n);
                let data = buffer[..n].to_vec();
                if signals.send(LinkSignal::Received { session: id, data }).is_err() {
                    return;
                }
            }
            Err(e) => break LinkError::read(&e),
        }
    };

    info!("Session {} input stream disconnected: {}", id, error);
    let _ = signals.send(LinkSignal::SessionClosed { session: id, error });
}

async fn run_session(
    id: SessionId,
    stream: BoxedStream,
    read_buffer_size: usize,
    write_queue: mpsc::Receiver<WriteRequest>,
    cancel: CancelToken,
    signals: SignalSender,
) {
    let (reader, writer) = tokio::io::split(stream);

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {}
        _ = read_loop(id, reader, read_buffer_size, signals) => {}
        _ = write_loop(id, writer, write_queue) => {}
    }

    // Dropping both halves here closes the stream; unsettled writes see their reply dropped.
    debug!("Session {} closing stream", id);
}
