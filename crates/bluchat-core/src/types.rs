//! Peer and service identity types

use core::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Service Identity
// ----------------------------------------------------------------------------

/// Standard Serial Port Profile UUID, shared by the listening and connecting side
pub const SERIAL_PORT_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// Name under which the listening endpoint is advertised
pub const DEFAULT_APP_NAME: &str = "BluetoothChat";

/// The protocol identity advertised by a listening endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Well-known service identifier
    pub uuid: Uuid,
    /// Human-readable application name
    pub name: String,
}

impl ServiceRecord {
    pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
        Self {
            uuid,
            name: name.into(),
        }
    }
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self::new(SERIAL_PORT_SERVICE_UUID, DEFAULT_APP_NAME)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

// ----------------------------------------------------------------------------
// Peer Identity
// ----------------------------------------------------------------------------

/// Transport address plus display label of a remote device.
///
/// Handed to the core by the discovery collaborator and never modified
/// afterwards, so the fields are only reachable through accessors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerIdentity {
    address: String,
    label: String,
}

impl PeerIdentity {
    pub fn new(address: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            label: label.into(),
        }
    }

    /// Identity for a peer whose only known name is its address
    pub fn unnamed(address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            label: address.clone(),
            address,
        }
    }

    /// Opaque transport address (Bluetooth MAC, `host:port`, ...)
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Human-readable label
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label == self.address {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} [{}]", self.label, self.address)
        }
    }
}
