//! Compute node metadata and cluster-wide state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of compute node.
///
/// Types other than `proxy` and `jdbc` are kept verbatim so that nodes of
/// any kind still show up as cluster members.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    #[default]
    Proxy,
    Jdbc,
    #[serde(untagged)]
    Other(String),
}

impl InstanceType {
    /// Parse a type segment; never fails.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "proxy" => Self::Proxy,
            "jdbc" => Self::Jdbc,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proxy => write!(f, "proxy"),
            Self::Jdbc => write!(f, "jdbc"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Per-node availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    #[default]
    Ok,
    CircuitBreak,
}

impl InstanceState {
    /// Parse a persisted state; anything unrecognized degrades to [`InstanceState::Ok`].
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "CIRCUIT_BREAK" => Self::CircuitBreak,
            _ => Self::Ok,
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::CircuitBreak => write!(f, "CIRCUIT_BREAK"),
        }
    }
}

/// Cluster-wide availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterState {
    #[default]
    Ok,
    ReadOnly,
    Unavailable,
}

impl ClusterState {
    /// Parse a persisted state; anything unrecognized degrades to [`ClusterState::Ok`].
    pub fn parse_or_default(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "READ_ONLY" => Self::ReadOnly,
            "UNAVAILABLE" => Self::Unavailable,
            _ => Self::Ok,
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::ReadOnly => write!(f, "READ_ONLY"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

/// Marker written under `/states/listener_assisted/{db}` to ask every node
/// to run a database lifecycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenerAssistedType {
    CreateDatabase,
    DropDatabase,
}

impl ListenerAssistedType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "CREATE_DATABASE" => Some(Self::CreateDatabase),
            "DROP_DATABASE" => Some(Self::DropDatabase),
            _ => None,
        }
    }
}

impl fmt::Display for ListenerAssistedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateDatabase => write!(f, "CREATE_DATABASE"),
            Self::DropDatabase => write!(f, "DROP_DATABASE"),
        }
    }
}

/// Attributes a node publishes when it comes online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceAttributes {
    pub host: String,
    pub port: u16,
    pub version: String,
}

impl Default for InstanceAttributes {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            version: String::new(),
        }
    }
}

impl InstanceAttributes {
    /// Decode published attributes; malformed content yields the defaults.
    pub fn decode_or_default(raw: &str) -> Self {
        serde_json::from_str(raw).unwrap_or_default()
    }

    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A member of the cluster as seen by this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComputeNodeInstance {
    pub id: String,
    pub instance_type: InstanceType,
    pub attributes: InstanceAttributes,
    pub labels: Vec<String>,
    pub worker_id: Option<u32>,
    pub state: InstanceState,
}

impl ComputeNodeInstance {
    pub fn new(id: impl Into<String>, instance_type: InstanceType) -> Self {
        Self {
            id: id.into(),
            instance_type,
            attributes: InstanceAttributes::default(),
            labels: Vec::new(),
            worker_id: None,
            state: InstanceState::Ok,
        }
    }

    pub fn with_attributes(mut self, attributes: InstanceAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }
}
