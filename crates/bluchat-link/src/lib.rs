//! Link layer for BluChat
//!
//! This crate owns everything that touches a live connection:
//!
//! - [`backend`] - the `LinkBackend`/`LinkEndpoint` abstraction and `Transport`
//! - [`tcp`] - TCP backend for development without a radio
//! - [`memory`] - in-process backend with resource accounting, used by tests
//! - `rfcomm` - Bluetooth Classic RFCOMM backend (Linux, `rfcomm` feature)
//! - [`listener`] - single-shot accept worker
//! - [`connector`] - single outbound connect worker
//! - [`session`] - read loop and write path over one transport
//! - [`cancel`] - idempotent cancellation token shared with workers
//! - [`signal`] - worker → coordinator messages tagged with epoch ids
//!
//! Every worker runs on its own tokio task and races its blocking call
//! against its [`CancelToken`]. A cancelled worker drops the resource it
//! owns, which is the only place that resource is ever closed.

pub mod backend;
pub mod cancel;
pub mod connector;
pub mod listener;
pub mod memory;
pub mod session;
pub mod signal;
pub mod tcp;

#[cfg(all(target_os = "linux", feature = "rfcomm"))]
pub mod rfcomm;

pub use backend::{
    stream_setup_failed, BoxedStream, LinkBackend, LinkEndpoint, LinkStream, SharedBackend,
    StreamSetupError, Transport,
};
pub use cancel::CancelToken;
pub use connector::Connector;
pub use listener::Listener;
pub use memory::{HubStats, MemoryHub, MemoryLink};
pub use session::{session_closed, PendingWrite, Session};
pub use signal::{create_signal_channel, AttemptId, LinkSignal, SessionId, SignalReceiver, SignalSender};
pub use tcp::TcpLink;

#[cfg(all(target_os = "linux", feature = "rfcomm"))]
pub use rfcomm::RfcommLink;
