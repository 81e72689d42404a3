//! Chat input parsing and top-level command dispatch

use tracing::info;

use crate::app::{render_peers, BluchatApp};
use crate::cli::{Cli, Commands};
use crate::config::ChatAppConfig;
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Chat Input
// ----------------------------------------------------------------------------

/// One line typed into the interactive chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatInput {
    Listen,
    Connect(String),
    Peers,
    State,
    Quit,
    Message(String),
}

/// Parse a chat line; slash commands are recognised, anything else is a message
pub fn parse_input(line: &str) -> Result<ChatInput> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyMessage);
    }

    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(ChatInput::Message(line.trim_end_matches(['\r', '\n']).to_string()));
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };

    match (name, argument) {
        ("listen", _) => Ok(ChatInput::Listen),
        ("connect", "") => Err(CliError::Usage(
            "usage: /connect <index|label|address>".to_string(),
        )),
        ("connect", peer) => Ok(ChatInput::Connect(peer.to_string())),
        ("peers", _) => Ok(ChatInput::Peers),
        ("state", _) => Ok(ChatInput::State),
        ("quit" | "exit", _) => Ok(ChatInput::Quit),
        (other, _) => Err(CliError::Usage(format!("unknown command: /{}", other))),
    }
}

// ----------------------------------------------------------------------------
// Command Dispatch
// ----------------------------------------------------------------------------

pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Run the selected subcommand; no subcommand means `chat`
    pub async fn execute(cli: Cli, config: ChatAppConfig) -> Result<()> {
        match cli.command.unwrap_or(Commands::Chat) {
            Commands::Config => {
                println!("{}", ChatAppConfig::example_config());
                Ok(())
            }
            Commands::Peers => {
                println!("{}", render_peers(&config.directory()));
                Ok(())
            }
            Commands::Chat => Self::chat(config, None).await,
            Commands::Listen => Self::chat(config, Some(ChatInput::Listen)).await,
            Commands::Connect { peer } => Self::chat(config, Some(ChatInput::Connect(peer))).await,
        }
    }

    async fn chat(config: ChatAppConfig, first: Option<ChatInput>) -> Result<()> {
        let app = BluchatApp::start(config).await?;

        let mut keep_going = true;
        if let Some(input) = first {
            info!("Starting in {:?} mode", input);
            match app.handle_input(input).await {
                Ok(proceed) => keep_going = proceed,
                Err(e) => println!("! {}", e),
            }
        }
        if keep_going {
            app.run_chat().await?;
        }

        app.stop().await
    }
}
