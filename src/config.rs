//! Server configuration.
//!
//! Loaded from a YAML file named by `SPINDLE_CONFIG`, falling back to
//! defaults. `LISTEN` overrides the listen address either way.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::connection::ConnectionSettings;
use crate::http::parser::DEFAULT_MAX_HEADER_BYTES;

pub const CONFIG_ENV: &str = "SPINDLE_CONFIG";
pub const LISTEN_ENV: &str = "LISTEN";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: Option<StaticFilesConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub max_header_bytes: usize,
    pub read_timeout_secs: Option<u64>,
    pub max_connections: usize,
    pub shutdown_grace_secs: u64,
    pub body_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            read_timeout_secs: None,
            max_connections: 1024,
            shutdown_grace_secs: 5,
            body_channel_capacity: 8,
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn connection_settings(&self) -> ConnectionSettings {
        ConnectionSettings {
            max_header_bytes: self.max_header_bytes,
            read_timeout: self.read_timeout(),
            body_channel_capacity: self.body_channel_capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticFilesConfig {
    /// Router prefix the files are served under
    pub mount: String,
    pub root: PathBuf,
    /// Resolve files relative to `mount` instead of the full path
    pub strip_prefix: bool,
    /// Extra headers on every file response
    pub headers: BTreeMap<String, String>,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            mount: "/".to_string(),
            root: PathBuf::from("./public"),
            strip_prefix: false,
            headers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads from the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Loads using `lookup` for environment variables.
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let mut cfg = match lookup(CONFIG_ENV) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(addr) = lookup(LISTEN_ENV) {
            cfg.server.listen_addr = addr;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let server = &self.server;
        anyhow::ensure!(!server.listen_addr.is_empty(), "server.listen_addr is empty");
        anyhow::ensure!(
            server.max_header_bytes >= 16,
            "server.max_header_bytes must be at least 16"
        );
        anyhow::ensure!(server.max_connections > 0, "server.max_connections must be positive");
        anyhow::ensure!(
            server.body_channel_capacity > 0,
            "server.body_channel_capacity must be positive"
        );
        if let Some(files) = &self.static_files {
            anyhow::ensure!(
                files.mount.starts_with('/'),
                "static_files.mount must start with '/'"
            );
        }
        Ok(())
    }
}
