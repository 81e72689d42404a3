//! Consumer-facing events and coordinator states
//!
//! Everything the core has to tell the outside world flows through one
//! bounded channel of [`AppEvent`]s. The consumer decides on which thread or
//! task it drains the channel, so the core never assumes same-thread delivery.

use core::fmt;

use tokio::sync::mpsc;

use crate::config::ChannelConfig;
use crate::errors::LinkError;
use crate::types::PeerIdentity;

// ----------------------------------------------------------------------------
// AppEvent: Core → Consumer
// ----------------------------------------------------------------------------

/// Events delivered from the connection coordinator to its consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A listening endpoint is being advertised
    Listening,
    /// An outbound attempt to `peer` has started
    Connecting { peer: PeerIdentity },
    /// A transport is established and its session is reading
    Connected { peer: PeerIdentity },
    /// One chunk read from the transport, exactly as it arrived
    MessageReceived { peer: PeerIdentity, data: Vec<u8> },
    /// Bytes flushed to the transport
    Sent { data: Vec<u8> },
    /// A recoverable failure; the coordinator is back in a consistent state
    TransientError { error: LinkError },
    /// The active transport was lost
    Disconnected { peer: PeerIdentity, reason: String },
}

impl AppEvent {
    /// Received or sent payload decoded as text, lossily
    pub fn text(&self) -> Option<String> {
        match self {
            Self::MessageReceived { data, .. } | Self::Sent { data } => {
                Some(String::from_utf8_lossy(data).into_owned())
            }
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Connection State
// ----------------------------------------------------------------------------

/// Coordinator state machine position
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Listening,
    Connecting { peer: PeerIdentity },
    Connected { peer: PeerIdentity },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Listening => "Listening",
            Self::Connecting { .. } => "Connecting",
            Self::Connected { .. } => "Connected",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting { peer } | Self::Connected { peer } => {
                write!(f, "{} ({})", self.name(), peer)
            }
            _ => f.write_str(self.name()),
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Creation
// ----------------------------------------------------------------------------

pub type AppEventSender = mpsc::Sender<AppEvent>;
pub type AppEventReceiver = mpsc::Receiver<AppEvent>;

/// Create the coordinator → consumer event channel
pub fn create_app_event_channel(config: &ChannelConfig) -> (AppEventSender, AppEventReceiver) {
    mpsc::channel(config.event_buffer_size)
}
