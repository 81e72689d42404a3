//! BluChat application: backend construction, event printing and the chat loop

use std::io::Write;
use std::sync::Arc;

use bluchat_core::{select_peer, AppEvent, AppEventReceiver, PeerDirectory, StaticDirectory};
use bluchat_link::{SharedBackend, TcpLink};
use bluchat_runtime::{CoordinatorBuilder, CoordinatorHandle, RunningCoordinator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::commands::{parse_input, ChatInput};
use crate::config::{BackendConfig, BackendKind, ChatAppConfig};
use crate::error::{CliError, Result};

// ----------------------------------------------------------------------------
// Backend Construction
// ----------------------------------------------------------------------------

/// Build the link backend selected in the configuration
pub async fn build_backend(config: &BackendConfig) -> Result<SharedBackend> {
    let kind = config.backend_kind()?;
    let backend: SharedBackend = match kind {
        BackendKind::Tcp => Arc::new(TcpLink::new(config.bind_address.clone())),
        BackendKind::Rfcomm => open_rfcomm().await?,
    };
    info!("Using {} link backend", backend.name());
    Ok(backend)
}

#[cfg(all(target_os = "linux", feature = "rfcomm"))]
async fn open_rfcomm() -> Result<SharedBackend> {
    let link = bluchat_link::RfcommLink::open()
        .await
        .map_err(|e| CliError::BackendInit(e.to_string()))?;
    Ok(Arc::new(link))
}

#[cfg(not(all(target_os = "linux", feature = "rfcomm")))]
async fn open_rfcomm() -> Result<SharedBackend> {
    Err(CliError::FeatureNotAvailable(
        "the rfcomm backend needs Linux and the `rfcomm` feature".to_string(),
    ))
}

// ----------------------------------------------------------------------------
// Event Rendering
// ----------------------------------------------------------------------------

/// One line of terminal output for a coordinator event
pub fn render_event(event: &AppEvent) -> String {
    match event {
        AppEvent::Listening => "Waiting for connections...".to_string(),
        AppEvent::Connecting { peer } => format!("Connecting to: {}...", peer.label()),
        AppEvent::Connected { peer } => format!("Connected to: {}", peer.label()),
        AppEvent::MessageReceived { peer, data } => {
            format!("Received from {}: {}", peer.label(), String::from_utf8_lossy(data))
        }
        AppEvent::Sent { data } => format!("Me: {}", String::from_utf8_lossy(data)),
        AppEvent::TransientError { error } => format!("! {}", error),
        AppEvent::Disconnected { peer, reason } => {
            format!("! Device connection was lost: {} ({})", peer.label(), reason)
        }
    }
}

async fn print_events(mut events: AppEventReceiver) {
    while let Some(event) = events.recv().await {
        debug!("App event: {:?}", event);
        println!("{}", render_event(&event));
    }
}

/// Numbered listing of known peers, as `/peers` prints it
pub fn render_peers(directory: &dyn PeerDirectory) -> String {
    let peers = directory.known_peers();
    if peers.is_empty() {
        return "No paired devices".to_string();
    }
    peers
        .iter()
        .enumerate()
        .map(|(index, peer)| format!("  [{}] {} ({})", index, peer.label(), peer.address()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ----------------------------------------------------------------------------
// Application
// ----------------------------------------------------------------------------

/// A running coordinator plus the terminal around it
pub struct BluchatApp {
    config: ChatAppConfig,
    directory: StaticDirectory,
    coordinator: RunningCoordinator,
    printer: JoinHandle<()>,
}

impl BluchatApp {
    /// Build the backend and spawn the coordinator
    pub async fn start(config: ChatAppConfig) -> Result<Self> {
        let backend = build_backend(&config.backend).await?;
        Self::with_backend(config, backend)
    }

    /// Spawn the coordinator over an already constructed backend
    pub fn with_backend(config: ChatAppConfig, backend: SharedBackend) -> Result<Self> {
        let mut coordinator = CoordinatorBuilder::from_shared(backend)
            .with_link_config(config.link.clone())
            .with_channel_config(config.channels.clone())
            .spawn()?;
        let events = coordinator
            .take_events()
            .ok_or_else(|| CliError::BackendInit("event receiver already taken".to_string()))?;
        let printer = tokio::spawn(print_events(events));

        Ok(Self {
            directory: config.directory(),
            config,
            coordinator,
            printer,
        })
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.coordinator.handle()
    }

    pub fn peers_listing(&self) -> String {
        render_peers(&self.directory)
    }

    pub async fn listen(&self) -> Result<()> {
        self.handle().start_listening().await?;
        Ok(())
    }

    /// Connect to a configured peer picked by index, label or address
    pub async fn connect(&self, selector: &str) -> Result<()> {
        let peer = select_peer(&self.directory, selector)?;
        self.handle().connect(peer).await?;
        Ok(())
    }

    /// Apply one line of chat input; returns false when the user asked to quit
    pub async fn handle_input(&self, input: ChatInput) -> Result<bool> {
        match input {
            ChatInput::Listen => self.listen().await?,
            ChatInput::Connect(selector) => self.connect(&selector).await?,
            ChatInput::Peers => println!("{}", self.peers_listing()),
            ChatInput::State => println!("State: {}", self.handle().state().await?),
            ChatInput::Quit => return Ok(false),
            ChatInput::Message(text) => self.handle().send(&text).await?,
        }
        Ok(true)
    }

    /// Read lines from stdin until `/quit`, end of input or Ctrl-C
    pub async fn run_chat(&self) -> Result<()> {
        println!("Type a message, or /listen, /connect <peer>, /peers, /state, /quit");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("{}", self.config.cli.prompt);
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            };
            let Some(line) = line else {
                break;
            };

            // A send can wait on a slow peer; Ctrl-C still wins.
            let keep_going = match parse_input(&line) {
                Ok(input) => tokio::select! {
                    result = self.handle_input(input) => result,
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal");
                        break;
                    }
                },
                Err(e) => Err(e),
            };
            match keep_going {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => println!("! {}", e),
            }
        }

        Ok(())
    }

    /// Tear everything down and wait for the last events to print
    pub async fn stop(self) -> Result<()> {
        info!("Stopping BluChat");
        self.coordinator.shutdown().await?;
        if let Err(e) = self.printer.await {
            debug!("Event printer ended abnormally: {}", e);
        }
        Ok(())
    }
}
