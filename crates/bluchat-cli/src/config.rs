//! BluChat CLI Configuration Management
//!
//! Configuration is layered with figment, lowest priority first:
//! - built-in defaults
//! - `bluchat.toml` in the working directory
//! - the file passed with `--config`
//! - environment variables (`BLUCHAT_*`, nested keys separated by `__`,
//!   e.g. `BLUCHAT_LINK__READ_BUFFER_SIZE=512`)
//! - command line flags

use std::path::Path;

use bluchat_core::{ChannelConfig, LinkConfig, PeerIdentity, StaticDirectory};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const LOCAL_CONFIG_FILE: &str = "bluchat.toml";

// ----------------------------------------------------------------------------
// CLI Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the BluChat CLI application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatAppConfig {
    /// Service record, read buffer and connect timeout
    pub link: LinkConfig,

    /// Command and event channel capacities
    pub channels: ChannelConfig,

    /// Which link backend carries the chat
    pub backend: BackendConfig,

    /// Known peers, in the order `/peers` lists them
    pub peers: Vec<PeerEntry>,

    /// Interactive interface settings
    pub cli: CliConfig,
}

/// Link backend selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// One of `tcp`, `rfcomm`
    pub kind: String,

    /// Address listening endpoints bind to (TCP: `host:port`)
    pub bind_address: String,
}

/// The backend kinds the CLI knows how to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Tcp,
    Rfcomm,
}

/// One known peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerEntry {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// CLI-specific configuration options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Enable verbose logging output
    pub verbose: bool,

    /// Prompt shown before each input line
    pub prompt: String,
}

// ----------------------------------------------------------------------------
// Default Implementations
// ----------------------------------------------------------------------------

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: "tcp".to_string(),
            bind_address: "0.0.0.0:4410".to_string(),
        }
    }
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            prompt: "bluchat> ".to_string(),
        }
    }
}

impl PeerEntry {
    pub fn identity(&self) -> PeerIdentity {
        match &self.label {
            Some(label) => PeerIdentity::new(self.address.clone(), label.clone()),
            None => PeerIdentity::unnamed(self.address.clone()),
        }
    }
}

impl BackendConfig {
    pub fn backend_kind(&self) -> Result<BackendKind, ConfigError> {
        match self.kind.to_ascii_lowercase().as_str() {
            "tcp" => Ok(BackendKind::Tcp),
            "rfcomm" => Ok(BackendKind::Rfcomm),
            other => Err(ConfigError::Validation(format!(
                "Unknown backend: {} (expected tcp or rfcomm)",
                other
            ))),
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Loading Logic
// ----------------------------------------------------------------------------

impl ChatAppConfig {
    fn base_figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(LOCAL_CONFIG_FILE))
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: ChatAppConfig = figment
            .extract()
            .map_err(|e| ConfigError::Loading(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load defaults, `bluchat.toml`, an optional explicit file and the environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_overrides(path, None, None, None)
    }

    /// Load as [`ChatAppConfig::load`], then apply command line overrides
    pub fn load_with_overrides(
        path: Option<&str>,
        backend: Option<String>,
        bind_address: Option<String>,
        verbose: Option<bool>,
    ) -> Result<Self, ConfigError> {
        let mut figment = Self::base_figment();

        if let Some(path) = path {
            if !Path::new(path).exists() {
                return Err(ConfigError::FileSystem(format!(
                    "Configuration file not found: {}",
                    path
                )));
            }
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("BLUCHAT_").split("__"));

        if let Some(kind) = backend {
            figment = figment.merge(("backend.kind", kind));
        }
        if let Some(address) = bind_address {
            figment = figment.merge(("backend.bind_address", address));
        }
        if let Some(v) = verbose {
            figment = figment.merge(("cli.verbose", v));
        }

        Self::extract(figment)
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        Self::extract(
            Figment::new()
                .merge(Serialized::defaults(Self::default()))
                .merge(Toml::string(toml)),
        )
    }

    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.backend_kind()?;

        if self.backend.bind_address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "Backend bind address must not be empty".to_string(),
            ));
        }

        self.link
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        self.channels
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if let Some(peer) = self.peers.iter().find(|p| p.address.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "Peer {:?} has an empty address",
                peer.label
            )));
        }

        Ok(())
    }

    /// Configured peers as the discovery collaborator
    pub fn directory(&self) -> StaticDirectory {
        StaticDirectory::new(self.peers.iter().map(PeerEntry::identity).collect())
    }

    /// Create example configuration file content
    pub fn example_config() -> String {
        let example = ChatAppConfig {
            peers: vec![
                PeerEntry {
                    address: "192.168.1.20:4410".to_string(),
                    label: Some("laptop".to_string()),
                },
                PeerEntry {
                    address: "00:1A:7D:DA:71:13".to_string(),
                    label: Some("phone".to_string()),
                },
            ],
            ..Default::default()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Failed to generate example config".to_string())
    }
}

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Configuration-related errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {0}")]
    Loading(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    FileSystem(String),
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use bluchat_core::PeerDirectory;

    #[test]
    fn test_default_config_creation() {
        let config = ChatAppConfig::default();
        assert!(!config.cli.verbose);
        assert_eq!(config.cli.prompt, "bluchat> ");
        assert_eq!(config.backend.backend_kind().unwrap(), BackendKind::Tcp);
        assert_eq!(config.link.app_name, "BluetoothChat");
        assert!(config.peers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = ChatAppConfig::default();

        let mut invalid = config.clone();
        invalid.backend.kind = "carrier-pigeon".to_string();
        assert!(matches!(invalid.validate(), Err(ConfigError::Validation(_))));

        // The in-process backend has no peers outside the process.
        let mut invalid = config.clone();
        invalid.backend.kind = "memory".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.link.read_buffer_size = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.channels.event_buffer_size = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.peers.push(PeerEntry {
            address: " ".to_string(),
            label: None,
        });
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_toml_layering_over_defaults() {
        let config = ChatAppConfig::from_toml_str(
            r#"
            [link]
            read_buffer_size = 512

            [backend]
            kind = "rfcomm"

            [[peers]]
            address = "AA:BB:CC:DD:EE:FF"
            label = "phone"
            "#,
        )
        .unwrap();

        assert_eq!(config.link.read_buffer_size, 512);
        assert_eq!(config.link.app_name, "BluetoothChat");
        assert_eq!(config.backend.backend_kind().unwrap(), BackendKind::Rfcomm);
        assert_eq!(config.backend.bind_address, "0.0.0.0:4410");
        assert_eq!(config.directory().known_peers()[0].label(), "phone");
    }

    #[test]
    fn test_unlabelled_peer_uses_address() {
        let entry = PeerEntry {
            address: "10.0.0.2:4410".to_string(),
            label: None,
        };
        assert_eq!(entry.identity().label(), "10.0.0.2:4410");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ChatAppConfig::load(Some("/definitely/not/here/bluchat.toml"));
        assert!(matches!(result, Err(ConfigError::FileSystem(_))));
    }

    #[test]
    fn test_example_config_generation() {
        let example = ChatAppConfig::example_config();
        assert!(example.contains("[link]"));
        assert!(example.contains("[backend]"));
        assert!(example.contains("[[peers]]"));
        assert!(example.contains("[cli]"));

        let parsed = ChatAppConfig::from_toml_str(&example).unwrap();
        assert_eq!(parsed.peers.len(), 2);
    }
}
