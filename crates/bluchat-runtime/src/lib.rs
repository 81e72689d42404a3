//! BluChat Runtime
//!
//! The connection coordinator: one actor task that owns the pending
//! listener/connector and the active session, serializes every role
//! transition and relays worker signals to the consumer as [`AppEvent`]s.
//!
//! ```no_run
//! # async fn demo() -> bluchat_core::ChatResult<()> {
//! use bluchat_link::TcpLink;
//! use bluchat_runtime::CoordinatorBuilder;
//!
//! let mut coordinator = CoordinatorBuilder::new(TcpLink::new("0.0.0.0:4410")).spawn()?;
//! let mut events = coordinator.take_events().expect("fresh coordinator");
//! coordinator.handle().start_listening().await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`AppEvent`]: bluchat_core::AppEvent

mod coordinator;

pub mod builder;
pub mod handle;

pub use builder::{CoordinatorBuilder, RunningCoordinator};
pub use handle::CoordinatorHandle;

// Re-export core types for convenience
pub use bluchat_core::{
    AppEvent, AppEventReceiver, ChannelConfig, ChatError, ChatResult, ConnectionState, LinkConfig,
    LinkError, LinkErrorKind, PeerIdentity,
};
