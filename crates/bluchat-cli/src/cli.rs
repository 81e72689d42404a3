//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Link backend to use (tcp, rfcomm); overrides the config file
    #[arg(short, long)]
    pub backend: Option<String>,

    /// Address to bind when listening; overrides the config file
    #[arg(long)]
    pub bind: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start interactive chat mode
    Chat,
    /// Wait for a peer to connect, then chat
    Listen,
    /// Connect to a peer, then chat
    Connect {
        /// Peer index, label or address
        peer: String,
    },
    /// List configured peers
    Peers,
    /// Print an example configuration file
    Config,
}
