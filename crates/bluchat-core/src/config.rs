//! Link and channel configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ChatError, ChatResult};
use crate::types::{ServiceRecord, DEFAULT_APP_NAME, SERIAL_PORT_SERVICE_UUID};

// ----------------------------------------------------------------------------
// Link Configuration
// ----------------------------------------------------------------------------

/// Settings shared by the listener, connector and session workers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service identifier used both to advertise and to connect
    pub service_uuid: Uuid,
    /// Application name attached to the advertised endpoint
    pub app_name: String,
    /// Size of the session read buffer; one read yields at most this many bytes
    pub read_buffer_size: usize,
    /// Upper bound for one outbound connect, 0 disables the bound
    pub connect_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: SERIAL_PORT_SERVICE_UUID,
            app_name: DEFAULT_APP_NAME.to_string(),
            read_buffer_size: 1024,
            connect_timeout_ms: 0,
        }
    }
}

impl LinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the advertised service identifier
    pub fn with_service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Set the advertised application name
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Set the session read buffer size
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Bound outbound connects
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn service(&self) -> ServiceRecord {
        ServiceRecord::new(self.service_uuid, self.app_name.clone())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.connect_timeout_ms > 0).then(|| Duration::from_millis(self.connect_timeout_ms))
    }

    pub fn validate(&self) -> ChatResult<()> {
        if self.read_buffer_size == 0 {
            return Err(ChatError::config("read buffer size must be greater than 0"));
        }
        if self.app_name.trim().is_empty() {
            return Err(ChatError::config("application name must not be empty"));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes of the consumer-facing channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub command_buffer_size: usize,
    pub event_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            event_buffer_size: 256,
        }
    }
}

impl ChannelConfig {
    pub fn validate(&self) -> ChatResult<()> {
        if self.command_buffer_size == 0 || self.event_buffer_size == 0 {
            return Err(ChatError::config("channel buffer sizes must be greater than 0"));
        }
        Ok(())
    }
}
