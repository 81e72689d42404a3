//! Command handle for a running coordinator

use bluchat_core::{ChatError, ChatResult, ConnectionState, PeerIdentity};
use tokio::sync::oneshot;

use crate::coordinator::{Command, CommandSender, Reply};

/// Clonable front door to the connection coordinator.
///
/// Every method resolves once the coordinator has applied the command, so a
/// returned `connect` means the previous role and session are already gone.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    commands: CommandSender,
}

impl CoordinatorHandle {
    pub(crate) fn new(commands: CommandSender) -> Self {
        Self { commands }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> ChatResult<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ChatError::CoordinatorStopped)?;
        response.await.map_err(|_| ChatError::CoordinatorStopped)?
    }

    /// Cancel whatever is active and advertise a listening endpoint
    pub async fn start_listening(&self) -> ChatResult<()> {
        self.request(|reply| Command::StartListening { reply }).await
    }

    /// Cancel whatever is active and start one outbound attempt to `peer`
    pub async fn connect(&self, peer: PeerIdentity) -> ChatResult<()> {
        self.request(|reply| Command::Connect { peer, reply }).await
    }

    /// Send text over the current session
    pub async fn send(&self, text: &str) -> ChatResult<()> {
        self.send_bytes(text.as_bytes().to_vec()).await
    }

    /// Send raw bytes over the current session.
    ///
    /// Fails with [`ChatError::NotConnected`] outside `Connected` without
    /// touching any stream.
    pub async fn send_bytes(&self, data: Vec<u8>) -> ChatResult<()> {
        self.request(|reply| Command::Send { data, reply }).await
    }

    pub async fn state(&self) -> ChatResult<ConnectionState> {
        self.request(|reply| Command::State { reply }).await
    }

    /// Cancel and release everything, returning to `Idle`. Safe to repeat.
    pub async fn teardown(&self) -> ChatResult<()> {
        self.request(|reply| Command::Teardown { reply }).await
    }

    /// Tear down and stop the coordinator task
    pub async fn shutdown(self) -> ChatResult<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Whether the coordinator task has stopped accepting commands
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
