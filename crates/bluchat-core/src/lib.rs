//! BluChat Core
//!
//! Foundational types shared by every BluChat crate: peer identities, the
//! advertised service record, the consumer-facing event type, coordinator
//! states, configuration and the error taxonomy.
//!
//! The crate is deliberately free of I/O. Link backends live in
//! `bluchat-link` and the connection coordinator in `bluchat-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod directory;
pub mod errors;
pub mod events;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::{ChannelConfig, LinkConfig};
pub use directory::{select_peer, PeerDirectory, StaticDirectory};
pub use errors::{ChatError, ChatResult, LinkError, LinkErrorKind};
pub use events::{
    create_app_event_channel, AppEvent, AppEventReceiver, AppEventSender, ConnectionState,
};
pub use types::{PeerIdentity, ServiceRecord, DEFAULT_APP_NAME, SERIAL_PORT_SERVICE_UUID};
