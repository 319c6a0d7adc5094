//! Daemon registry - name to socket parameters
//!
//! Built once at startup and handed out by reference.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{Config, DaemonEntry};
use crate::error::{FramesockError, Result};
use crate::ipc::codec::HeaderFormat;

/// Transport tag carried by each descriptor.
///
/// Historical label only. Every daemon is reached over a local stream socket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "TCP"),
            Protocol::Udp => write!(f, "UDP"),
        }
    }
}

/// Connection parameters for one daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonDescriptor {
    pub name: String,
    pub protocol: Protocol,
    pub path: PathBuf,
    pub header_format: HeaderFormat,
    /// Header bytes stripped from each response
    pub size: usize,
}

impl DaemonDescriptor {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>, header_format: HeaderFormat) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Tcp,
            path: path.into(),
            size: header_format.size(),
            header_format,
        }
    }

    fn from_entry(name: &str, entry: &DaemonEntry) -> Result<Self> {
        let size = entry.size.unwrap_or_else(|| entry.header_format.size());
        if size != entry.header_format.size() {
            return Err(FramesockError::Config(format!(
                "daemon {}: size {} does not match header format {} ({} bytes)",
                name,
                size,
                entry.header_format,
                entry.header_format.size()
            )));
        }

        Ok(Self {
            name: name.to_string(),
            protocol: entry.protocol,
            path: entry.path.clone(),
            header_format: entry.header_format,
            size,
        })
    }
}

/// Immutable lookup table of known daemons.
#[derive(Debug, Clone, Default)]
pub struct DaemonRegistry {
    daemons: BTreeMap<String, DaemonDescriptor>,
}

impl DaemonRegistry {
    /// Registry holding only the built-in daemons, with sockets under `socket_dir`.
    pub fn builtin(socket_dir: impl AsRef<Path>) -> Self {
        let authd = DaemonDescriptor::new("authd", socket_dir.as_ref().join("auth"), HeaderFormat::LE_U32);
        Self::from_descriptors([authd])
    }

    /// Built-in daemons with the config's entries layered on top.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::builtin(&config.socket_dir);
        for (name, entry) in &config.daemons {
            let descriptor = DaemonDescriptor::from_entry(name, entry)?;
            log::debug!("Registering daemon {} at {}", name, descriptor.path.display());
            registry.daemons.insert(name.clone(), descriptor);
        }
        Ok(registry)
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = DaemonDescriptor>) -> Self {
        let daemons = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self { daemons }
    }

    /// Look up a daemon by name.
    pub fn get(&self, name: &str) -> Result<&DaemonDescriptor> {
        self.daemons
            .get(name)
            .ok_or_else(|| FramesockError::UnknownDaemon(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.daemons.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DaemonDescriptor> {
        self.daemons.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.daemons.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.daemons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.daemons.is_empty()
    }
}
