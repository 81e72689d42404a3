//! BluChat CLI library
//!
//! Terminal consumer of the connection coordinator: argument parsing,
//! layered configuration, the event printer and the interactive chat loop.

pub mod app;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use app::BluchatApp;
pub use cli::{Cli, Commands};
pub use config::ChatAppConfig;
pub use error::{CliError, Result};
