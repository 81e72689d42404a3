//! Connection Coordinator
//!
//! A single actor task owning the pending attempt slot and the session slot.
//! Commands from handles and signals from workers are both funnelled into
//! its `select!` loop, so every transition runs to completion before the
//! next one starts. Replacing a role or session always cancels the old
//! worker and joins it before the new one is spawned.

use bluchat_core::{
    AppEvent, AppEventSender, ChatError, ChatResult, ConnectionState, LinkConfig, LinkError,
    PeerIdentity,
};
use bluchat_link::{
    create_signal_channel, session_closed, AttemptId, Connector, LinkSignal, Listener,
    PendingWrite, Session, SessionId, SharedBackend, SignalReceiver, SignalSender, Transport,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

pub(crate) type Reply<T> = oneshot::Sender<ChatResult<T>>;

/// Requests accepted by the coordinator task
#[derive(Debug)]
pub(crate) enum Command {
    StartListening { reply: Reply<()> },
    Connect { peer: PeerIdentity, reply: Reply<()> },
    Send { data: Vec<u8>, reply: Reply<()> },
    State { reply: Reply<ConnectionState> },
    Teardown { reply: Reply<()> },
    Shutdown { reply: Reply<()> },
}

pub(crate) type CommandSender = mpsc::Sender<Command>;
pub(crate) type CommandReceiver = mpsc::Receiver<Command>;

// ----------------------------------------------------------------------------
// Pending Attempt
// ----------------------------------------------------------------------------

/// The role currently trying to produce a transport
#[derive(Debug)]
enum PendingAttempt {
    Listener(Listener),
    Connector(Connector),
}

impl PendingAttempt {
    fn attempt(&self) -> AttemptId {
        match self {
            Self::Listener(listener) => listener.attempt(),
            Self::Connector(connector) => connector.attempt(),
        }
    }

    fn cancel(&self) {
        match self {
            Self::Listener(listener) => listener.cancel(),
            Self::Connector(connector) => connector.cancel(),
        }
    }

    async fn join(self) {
        match self {
            Self::Listener(listener) => listener.join().await,
            Self::Connector(connector) => connector.join().await,
        }
    }
}

// ----------------------------------------------------------------------------
// Coordinator Task
// ----------------------------------------------------------------------------

pub(crate) struct CoordinatorTask {
    backend: SharedBackend,
    config: LinkConfig,
    commands: CommandReceiver,
    signals_tx: SignalSender,
    signals_rx: SignalReceiver,
    events: AppEventSender,
    pending: Option<PendingAttempt>,
    session: Option<Session>,
    state: ConnectionState,
    next_attempt: u64,
    next_session: u64,
}

impl CoordinatorTask {
    pub(crate) fn new(
        backend: SharedBackend,
        config: LinkConfig,
        commands: CommandReceiver,
        events: AppEventSender,
    ) -> Self {
        let (signals_tx, signals_rx) = create_signal_channel();
        Self {
            backend,
            config,
            commands,
            signals_tx,
            signals_rx,
            events,
            pending: None,
            session: None,
            state: ConnectionState::Idle,
            next_attempt: 0,
            next_session: 0,
        }
    }

    pub(crate) async fn run(mut self) {
        info!("Connection coordinator started on {} backend", self.backend.name());

        loop {
            tokio::select! {
                // Worker signals first, so a settled transition is visible to the next command.
                biased;
                Some(signal) = self.signals_rx.recv() => {
                    self.handle_signal(signal).await;
                }
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        debug!("All coordinator handles dropped");
                        self.teardown().await;
                        break;
                    }
                },
            }
        }

        info!("Connection coordinator stopped");
    }

    // ------------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------------

    /// Apply one command; returns false once the coordinator should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::StartListening { reply } => {
                self.start_listening().await;
                let _ = reply.send(Ok(()));
            }
            Command::Connect { peer, reply } => {
                self.connect(peer).await;
                let _ = reply.send(Ok(()));
            }
            Command::Send { data, reply } => {
                self.send(data, reply).await;
            }
            Command::State { reply } => {
                let _ = reply.send(Ok(self.state.clone()));
            }
            Command::Teardown { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
            }
            Command::Shutdown { reply } => {
                self.teardown().await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    async fn start_listening(&mut self) {
        self.teardown().await;

        let attempt = self.allocate_attempt();
        let listener = Listener::start(
            self.backend.clone(),
            self.config.service(),
            attempt,
            self.signals_tx.clone(),
        );
        self.pending = Some(PendingAttempt::Listener(listener));
        self.state = ConnectionState::Listening;
        info!("Waiting for connections ({})", attempt);
        self.emit(AppEvent::Listening).await;
    }

    async fn connect(&mut self, peer: PeerIdentity) {
        self.teardown().await;

        let attempt = self.allocate_attempt();
        let connector = Connector::start(
            self.backend.clone(),
            self.config.service(),
            peer.clone(),
            self.config.connect_timeout(),
            attempt,
            self.signals_tx.clone(),
        );
        self.pending = Some(PendingAttempt::Connector(connector));
        self.state = ConnectionState::Connecting { peer: peer.clone() };
        info!("Attempting to connect to {} ({})", peer, attempt);
        self.emit(AppEvent::Connecting { peer }).await;
    }

    /// Queue a write on the live session. The outcome is awaited off the
    /// actor, so a peer that stops reading cannot stall later commands.
    async fn send(&mut self, data: Vec<u8>, reply: Reply<()>) {
        let session = match (&self.state, &self.session) {
            (ConnectionState::Connected { .. }, Some(session)) => session,
            _ => {
                let _ = reply.send(Err(ChatError::NotConnected));
                return;
            }
        };

        match session.submit(data.clone()) {
            Ok(pending) => {
                tokio::spawn(complete_write(
                    session.id(),
                    pending,
                    data,
                    self.events.clone(),
                    reply,
                ));
            }
            Err(error) => {
                warn!("Send failed: {}", error);
                self.emit(AppEvent::TransientError {
                    error: error.clone(),
                })
                .await;
                let _ = reply.send(Err(ChatError::Link(error)));
            }
        }
    }

    /// Cancel and join whatever is active, then go Idle. No events; idempotent.
    async fn teardown(&mut self) {
        if let Some(pending) = self.pending.take() {
            debug!("Cancelling pending {}", pending.attempt());
            pending.cancel();
            pending.join().await;
        }
        if let Some(session) = self.session.take() {
            debug!("Closing {} with {}", session.id(), session.peer());
            session.cancel();
            session.join().await;
        }
        self.state = ConnectionState::Idle;
    }

    // ------------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------------

    async fn handle_signal(&mut self, signal: LinkSignal) {
        match signal {
            LinkSignal::Established { attempt, transport } => {
                self.on_established(attempt, transport).await;
            }
            LinkSignal::AttemptFailed { attempt, error } => {
                self.on_attempt_failed(attempt, error).await;
            }
            LinkSignal::Received { session, data } => {
                let Some(peer) = self.current_session_peer(session) else {
                    debug!("Discarding {} bytes from stale {}", data.len(), session);
                    return;
                };
                self.emit(AppEvent::MessageReceived { peer, data }).await;
            }
            LinkSignal::SessionClosed { session, error } => {
                self.on_session_closed(session, error).await;
            }
        }
    }

    async fn on_established(&mut self, attempt: AttemptId, transport: Transport) {
        if !self.is_current_attempt(attempt) {
            debug!(
                "Dropping transport to {} from stale {}",
                transport.peer(),
                attempt
            );
            return;
        }

        if let Some(pending) = self.pending.take() {
            pending.join().await;
        }
        if let Some(old) = self.session.take() {
            old.cancel();
            old.join().await;
        }

        let id = self.allocate_session();
        let peer = transport.peer().clone();
        let session = Session::start(
            id,
            transport,
            self.config.read_buffer_size,
            self.signals_tx.clone(),
        );
        self.session = Some(session);
        self.state = ConnectionState::Connected { peer: peer.clone() };
        info!("Connected to {} ({})", peer, id);
        self.emit(AppEvent::Connected { peer }).await;
    }

    async fn on_attempt_failed(&mut self, attempt: AttemptId, error: LinkError) {
        if !self.is_current_attempt(attempt) {
            debug!("Ignoring failure of stale {}: {}", attempt, error);
            return;
        }

        if let Some(pending) = self.pending.take() {
            pending.join().await;
        }
        self.state = ConnectionState::Idle;
        warn!("{} failed: {}", attempt, error);
        self.emit(AppEvent::TransientError { error }).await;
    }

    async fn on_session_closed(&mut self, session: SessionId, error: LinkError) {
        if self.session.as_ref().map(Session::id) != Some(session) {
            debug!("Ignoring close of stale {}", session);
            return;
        }

        let Some(closed) = self.session.take() else {
            return;
        };
        let peer = closed.peer().clone();
        closed.join().await;
        self.state = ConnectionState::Idle;
        info!("Disconnected from {}: {}", peer, error);
        self.emit(AppEvent::Disconnected {
            peer,
            reason: error.to_string(),
        })
        .await;
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn is_current_attempt(&self, attempt: AttemptId) -> bool {
        self.pending.as_ref().map(PendingAttempt::attempt) == Some(attempt)
    }

    fn current_session_peer(&self, id: SessionId) -> Option<PeerIdentity> {
        self.session
            .as_ref()
            .filter(|session| session.id() == id)
            .map(|session| session.peer().clone())
    }

    fn allocate_attempt(&mut self) -> AttemptId {
        self.next_attempt += 1;
        AttemptId(self.next_attempt)
    }

    fn allocate_session(&mut self) -> SessionId {
        self.next_session += 1;
        SessionId(self.next_session)
    }

    async fn emit(&self, event: AppEvent) {
        if self.events.send(event).await.is_err() {
            error!("Event consumer dropped; event lost");
        }
    }
}

/// Report a queued write once it settles. A write abandoned by teardown
/// fails for the caller but stays silent on the event stream.
async fn complete_write(
    session: SessionId,
    pending: PendingWrite,
    data: Vec<u8>,
    events: AppEventSender,
    reply: Reply<()>,
) {
    let (event, result) = match pending.settled().await {
        Some(Ok(())) => (Some(AppEvent::Sent { data }), Ok(())),
        Some(Err(error)) => {
            warn!("Send on {} failed: {}", session, error);
            (
                Some(AppEvent::TransientError {
                    error: error.clone(),
                }),
                Err(ChatError::Link(error)),
            )
        }
        None => {
            debug!("Write on {} abandoned: session closed", session);
            (None, Err(ChatError::Link(session_closed())))
        }
    };

    if let Some(event) = event {
        if events.send(event).await.is_err() {
            error!("Event consumer dropped; event lost");
        }
    }
    let _ = reply.send(result);
}
