use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::network::NodeSettings;
use crate::network::protocol::DEFAULT_MAX_FRAME_BYTES;

pub const DEFAULT_CONFIG_PATH: &str = "config/node.json";
pub const DEFAULT_DB_PATH: &str = "data/chat.db";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    pub connect_timeout_secs: u64,
    /// Idle read deadline per connection; unset disables it.
    pub read_timeout_secs: Option<u64>,
    pub outbound_queue: usize,
    pub max_frame_bytes: usize,
    pub show_history: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            connect_timeout_secs: 10,
            read_timeout_secs: None,
            outbound_queue: 256,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            show_history: true,
        }
    }
}

impl AppConfig {
    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs.max(1)),
            read_timeout: self
                .read_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            outbound_queue: self.outbound_queue.max(1),
            max_frame_bytes: self.max_frame_bytes.max(1024),
        }
    }
}

/// Read and parse a config file.
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Load the config at `path`. A missing or unreadable file is not fatal; the
/// node starts on defaults.
pub fn load_config(path: &str) -> AppConfig {
    match read_config(path) {
        Ok(config) => {
            log::info!("Loaded config from {path}");
            config
        }
        Err(ConfigError::Read(err)) if err.kind() == io::ErrorKind::NotFound => {
            log::info!("No config file at {path}; using defaults");
            AppConfig::default()
        }
        Err(err) => {
            log::warn!("Ignoring config file {path}: {err}");
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert_eq!(load_config(path.to_str().unwrap()), AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        fs::write(&path, r#"{"db_path":"/tmp/x.db","read_timeout_secs":30}"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.db_path, "/tmp/x.db");
        assert_eq!(config.connect_timeout_secs, 10);

        let settings = config.node_settings();
        assert_eq!(settings.read_timeout, Some(Duration::from_secs(30)));
        assert_eq!(settings.outbound_queue, 256);
    }

    #[test]
    fn invalid_json_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(read_config(&path), Err(ConfigError::Parse(_))));
        assert_eq!(load_config(path.to_str().unwrap()), AppConfig::default());
    }

    #[test]
    fn zero_read_timeout_disables_deadline() {
        let config = AppConfig {
            read_timeout_secs: Some(0),
            ..AppConfig::default()
        };
        assert_eq!(config.node_settings().read_timeout, None);
    }
}
