//! Error types for BluChat
//!
//! Two layers exist. [`LinkError`] describes failures that originate in link
//! I/O (bind, accept, connect, read, write). These are caught at the boundary
//! of the worker that hit them and travel to the consumer as events, so they
//! are `Clone` and carry their cause as text. [`ChatError`] is what a command
//! returns synchronously.

use std::io;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Link Errors
// ----------------------------------------------------------------------------

/// Discriminant of a [`LinkError`], convenient for matching in consumers and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkErrorKind {
    BindFailed,
    AcceptFailed,
    ConnectFailed,
    StreamSetupFailed,
    ReadFailed,
    WriteFailed,
}

/// Recoverable I/O failure of a listener, connector or session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("server socket listen failed: {reason}")]
    BindFailed { reason: String },

    #[error("server socket accept failed: {reason}")]
    AcceptFailed { reason: String },

    #[error("connection failed: {reason}")]
    ConnectFailed { reason: String },

    #[error("error getting streams: {reason}")]
    StreamSetupFailed { reason: String },

    #[error("device disconnected: {reason}")]
    ReadFailed { reason: String },

    #[error("error sending message: {reason}")]
    WriteFailed { reason: String },
}

impl LinkError {
    pub fn bind(err: &io::Error) -> Self {
        Self::BindFailed {
            reason: err.to_string(),
        }
    }

    pub fn accept(err: &io::Error) -> Self {
        Self::AcceptFailed {
            reason: err.to_string(),
        }
    }

    pub fn connect(err: &io::Error) -> Self {
        Self::ConnectFailed {
            reason: err.to_string(),
        }
    }

    pub fn read(err: &io::Error) -> Self {
        Self::ReadFailed {
            reason: err.to_string(),
        }
    }

    pub fn write(err: &io::Error) -> Self {
        Self::WriteFailed {
            reason: err.to_string(),
        }
    }

    pub fn kind(&self) -> LinkErrorKind {
        match self {
            Self::BindFailed { .. } => LinkErrorKind::BindFailed,
            Self::AcceptFailed { .. } => LinkErrorKind::AcceptFailed,
            Self::ConnectFailed { .. } => LinkErrorKind::ConnectFailed,
            Self::StreamSetupFailed { .. } => LinkErrorKind::StreamSetupFailed,
            Self::ReadFailed { .. } => LinkErrorKind::ReadFailed,
            Self::WriteFailed { .. } => LinkErrorKind::WriteFailed,
        }
    }
}

// ----------------------------------------------------------------------------
// Command Errors
// ----------------------------------------------------------------------------

/// Synchronous rejection of a consumer command
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("not connected to any device")]
    NotConnected,

    #[error("no paired devices found")]
    NoPeersAvailable,

    #[error("unknown peer: {selector}")]
    UnknownPeer { selector: String },

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("connection coordinator has stopped")]
    CoordinatorStopped,

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl ChatError {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// Result type for BluChat commands
pub type ChatResult<T> = core::result::Result<T, ChatError>;
