//! Configuration loading
//!
//! YAML file with a fallback chain: explicit path, then
//! `~/.config/framesock/framesock.yml`, then `./framesock.yml`, then defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::daemon::registry::Protocol;
use crate::error::{FramesockError, Result};
use crate::ipc::codec::{HeaderFormat, DEFAULT_MAX_FRAME_LEN};

/// Directory holding the daemon sockets when none is configured.
pub const DEFAULT_SOCKET_DIR: &str = "/var/ossec/queue/sockets";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    /// Base directory for the built-in daemon socket paths
    pub socket_dir: PathBuf,
    /// Largest frame length a receive will accept
    pub max_frame_len: usize,
    /// Additional daemons, or overrides of the built-in ones
    pub daemons: BTreeMap<String, DaemonEntry>,
}

/// One daemon as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonEntry {
    #[serde(default)]
    pub protocol: Protocol,
    pub path: PathBuf,
    #[serde(default)]
    pub header_format: HeaderFormat,
    /// Header bytes stripped on receive; defaults to the header format's width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            socket_dir: PathBuf::from(DEFAULT_SOCKET_DIR),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            daemons: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let project_name = env!("CARGO_PKG_NAME");

        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FramesockError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml(&content)
            .map_err(|e| FramesockError::Config(format!("{} ({})", e, path.display())))?;

        log::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| FramesockError::Config(format!("Failed to parse config: {}", e)))?;

        if config.max_frame_len == 0 {
            return Err(FramesockError::Config("max_frame_len must be positive".to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.socket_dir, PathBuf::from(DEFAULT_SOCKET_DIR));
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
        assert!(config.daemons.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("socket_dir: /tmp/sockets\n").unwrap();
        assert_eq!(config.socket_dir, PathBuf::from("/tmp/sockets"));
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME_LEN);
    }

    #[test]
    fn test_daemon_entries() {
        let yaml = r#"
daemons:
  authd:
    path: /tmp/auth
  statsd:
    protocol: UDP
    path: /tmp/stats
    header_format: ">H"
    size: 2
"#;
        let config = Config::from_yaml(yaml).unwrap();
        let authd = &config.daemons["authd"];
        assert_eq!(authd.protocol, Protocol::Tcp);
        assert_eq!(authd.header_format, HeaderFormat::LE_U32);
        assert_eq!(authd.size, None);

        let statsd = &config.daemons["statsd"];
        assert_eq!(statsd.protocol, Protocol::Udp);
        assert_eq!(statsd.header_format.size(), 2);
        assert_eq!(statsd.size, Some(2));
    }

    #[test]
    fn test_bad_header_format_is_config_error() {
        let yaml = "daemons:\n  x:\n    path: /tmp/x\n    header_format: \"<i\"\n";
        let err = Config::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, FramesockError::Config(_)));
    }

    #[test]
    fn test_zero_max_frame_len_rejected() {
        assert!(Config::from_yaml("max_frame_len: 0\n").is_err());
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level: debug").unwrap();
        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let err = Config::load(Some(&PathBuf::from("/nonexistent/framesock.yml"))).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::CONFIG);
    }
}
