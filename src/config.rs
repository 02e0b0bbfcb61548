use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Top-level server configuration, loaded from YAML.
///
/// Every section and field is optional; omitted values fall back to the
/// defaults below. The `HEARTH_CONFIG` environment variable names the
/// config file, and `LISTEN` overrides the bind address either way.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub pool: PoolConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the listener binds, e.g. `127.0.0.1:8080`.
    pub listen_addr: String,
    /// Ceiling on concurrently open connections; arrivals past it are
    /// dropped at accept.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".into(),
            max_connections: 65535,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Document root request paths are resolved under.
    pub root: PathBuf,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("public"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 10000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Seconds between idle-reaper passes.
    pub tick_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { tick_secs: 5 }
    }
}

impl TimeoutConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Idle deadline granted to a connection: three ticks, so a connection
    /// always survives at least two full reaper passes.
    pub fn idle(&self) -> Duration {
        self.tick() * 3
    }
}

impl Config {
    /// Loads configuration from the file named by `HEARTH_CONFIG`, or the
    /// defaults when unset, then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("HEARTH_CONFIG") {
            Ok(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {path}"))?;
                Self::from_yaml(&text)?
            }
            Err(_) => Self::default(),
        };
        if let Ok(addr) = std::env::var("LISTEN") {
            cfg.server.listen_addr = addr;
        }
        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(text).context("parsing YAML configuration")
    }
}
