//! Client Configuration
//!
//! Configuration for the chat client, loaded from a TOML file with serde
//! defaults so a partial (or absent) file still yields a working setup.
//! The live WebSocket base is derived from the REST base by scheme swap
//! unless configured explicitly.

use crate::{ClientError, Result};
use lancehub_chat_protocol::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Chat client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://api.lancehub.dev`
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Live endpoint base; derived from `api_base` when unset
    #[serde(default)]
    pub live_base: Option<String>,

    /// REST request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Fixed delay before the single live-connection reconnect attempt,
    /// in milliseconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

fn default_api_base() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    2000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            live_base: None,
            request_timeout_secs: default_request_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the default location
    ///
    /// Looks for `lancehub/chat.toml` under the platform config directory;
    /// a missing file yields the defaults.
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Default configuration file path for this platform
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("lancehub").join("chat.toml"))
    }

    /// Load configuration from a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            ClientError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            ClientError::Configuration(format!("cannot parse {}: {e}", path.display()))
        })
    }

    /// REST base with any trailing slash removed
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }

    /// Live endpoint base, configured or derived from `api_base`
    ///
    /// Derivation swaps the scheme (`http` → `ws`, `https` → `wss`) and
    /// appends the chat socket path.
    pub fn live_base(&self) -> String {
        if let Some(base) = &self.live_base {
            return base.trim_end_matches('/').to_string();
        }
        let base = self.api_base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/api/v1/chat/ws")
    }

    /// Connection manager configuration derived from this config
    pub fn connection(&self) -> ConnectionConfig {
        let mut connection = ConnectionConfig::new(self.live_base());
        connection.reconnect_delay = Duration::from_millis(self.reconnect_delay_ms);
        connection
    }

    /// REST request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.api_base, "http://localhost:8000");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn test_live_base_derived_from_http() {
        let config = ClientConfig {
            api_base: "http://localhost:8000/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.live_base(), "ws://localhost:8000/api/v1/chat/ws");
    }

    #[test]
    fn test_live_base_derived_from_https() {
        let config = ClientConfig {
            api_base: "https://api.lancehub.dev".to_string(),
            ..Default::default()
        };
        assert_eq!(config.live_base(), "wss://api.lancehub.dev/api/v1/chat/ws");
    }

    #[test]
    fn test_live_base_override_wins() {
        let config = ClientConfig {
            live_base: Some("wss://live.lancehub.dev/ws/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.live_base(), "wss://live.lancehub.dev/ws");
    }

    #[test]
    fn test_parse_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.toml");
        fs::write(&path, "api_base = \"https://api.example.com\"\n").unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.api_base, "https://api.example.com");
        // Unspecified fields fall back to defaults
        assert_eq!(config.reconnect_delay_ms, 2000);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chat.toml");
        fs::write(&path, "api_base = [not toml").unwrap();

        assert!(matches!(
            ClientConfig::from_file(&path),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_connection_config() {
        let config = ClientConfig {
            reconnect_delay_ms: 500,
            ..Default::default()
        };
        let connection = config.connection();
        assert_eq!(connection.reconnect_delay, Duration::from_millis(500));
        assert_eq!(connection.live_base, config.live_base());
    }
}
