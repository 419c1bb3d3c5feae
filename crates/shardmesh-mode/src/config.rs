//! Node configuration.
//!
//! Loaded from an optional TOML file and then overridden by environment
//! variables, e.g. `SHARDMESH__INSTANCE__PORT=3308`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use shardmesh_core::{ComputeNodeInstance, ConfigurationProperties, InstanceAttributes, InstanceType};
use uuid::Uuid;

use crate::{ModeError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "shardmesh.toml";
pub const ENV_PREFIX: &str = "SHARDMESH";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModeConfig {
    #[serde(default)]
    pub instance: InstanceSettings,
    #[serde(default)]
    pub repository: RepositorySettings,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Properties persisted on first start when the repository has none.
    #[serde(default)]
    pub props: ConfigurationProperties,
}

impl ModeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.instance.port == 0 {
            return Err(ModeError::Config("instance.port must be > 0".into()));
        }
        if self.instance.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ModeError::Config("instance.id must not be empty".into()));
        }
        if self.dispatch.event_buffer_size == 0 {
            return Err(ModeError::Config("dispatch.event_buffer_size must be > 0".into()));
        }
        if self.dispatch.watch_channel_capacity == 0 {
            return Err(ModeError::Config("dispatch.watch_channel_capacity must be > 0".into()));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ModeError::Config(format!("logging.level must be one of {valid_levels:?}")));
        }
        Ok(())
    }

    /// This node as a cluster member.
    pub fn compute_node_instance(&self) -> ComputeNodeInstance {
        let id = self
            .instance
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        ComputeNodeInstance::new(id, self.instance.instance_type.clone())
            .with_attributes(InstanceAttributes {
                host: self.instance.host.clone(),
                port: self.instance.port,
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .with_labels(self.instance.labels.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Stable instance id; a random one is generated when unset.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub instance_type: InstanceType,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3307
}

impl Default for InstanceSettings {
    fn default() -> Self {
        Self {
            id: None,
            instance_type: InstanceType::default(),
            host: default_host(),
            port: default_port(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryKind {
    #[default]
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RepositorySettings {
    #[serde(default, rename = "type")]
    pub kind: RepositoryKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Capacity of the typed event broadcast channel.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
    /// Capacity of the raw repository watch channel.
    #[serde(default = "default_watch_channel_capacity")]
    pub watch_channel_capacity: usize,
}

fn default_event_buffer_size() -> usize {
    1024
}

fn default_watch_channel_capacity() -> usize {
    256
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            event_buffer_size: default_event_buffer_size(),
            watch_channel_capacity: default_watch_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Load configuration from `path` (or `shardmesh.toml` when present) and
/// the environment, then validate it.
pub fn load_config(path: Option<&str>) -> Result<ModeConfig> {
    let mut builder = Config::builder();
    let file = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from);
    if file.exists() {
        builder = builder.add_source(File::from(file));
    }
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .separator("__"),
    );
    let cfg = builder
        .build()
        .map_err(|e| ModeError::Config(format!("config build error: {e}")))?;
    let merged: ModeConfig = cfg
        .try_deserialize()
        .map_err(|e| ModeError::Config(format!("config deserialize error: {e}")))?;
    merged.validate()?;
    Ok(merged)
}

pub fn load_config_with_default_path<P: AsRef<Path>>(path: Option<P>) -> Result<ModeConfig> {
    let p = path
        .as_ref()
        .map(|p| p.as_ref().to_string_lossy().to_string());
    load_config(p.as_deref())
}
