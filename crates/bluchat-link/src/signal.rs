//! Worker → coordinator signals
//!
//! Each listener/connector activation carries an [`AttemptId`] and each
//! session a [`SessionId`]. The coordinator compares the id of every signal
//! with the slot it currently holds and drops anything from a superseded
//! worker.

use core::fmt;

use bluchat_core::LinkError;
use tokio::sync::mpsc;

use crate::backend::Transport;

/// Epoch of one listener or connector activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

/// Epoch of one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attempt#{}", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug)]
pub enum LinkSignal {
    /// A role produced a live transport; ownership moves with the signal
    Established {
        attempt: AttemptId,
        transport: Transport,
    },
    /// A role failed to bind, accept or connect
    AttemptFailed { attempt: AttemptId, error: LinkError },
    /// One chunk read by a session
    Received { session: SessionId, data: Vec<u8> },
    /// A session's read loop ended on a read failure or end of stream
    SessionClosed { session: SessionId, error: LinkError },
}

// Unbounded so a worker never blocks while the coordinator is joining another worker.
pub type SignalSender = mpsc::UnboundedSender<LinkSignal>;
pub type SignalReceiver = mpsc::UnboundedReceiver<LinkSignal>;

pub fn create_signal_channel() -> (SignalSender, SignalReceiver) {
    mpsc::unbounded_channel()
}
