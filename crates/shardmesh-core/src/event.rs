//! Raw repository change notifications.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of change reported by a repository watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Added,
    Updated,
    Deleted,
}

impl ChangeType {
    pub fn all() -> &'static [ChangeType] {
        &[Self::Added, Self::Updated, Self::Deleted]
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "ADDED"),
            Self::Updated => write!(f, "UPDATED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// One notification from a watched repository subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataChangedEvent {
    pub key: String,
    pub value: String,
    pub event_type: ChangeType,
}

impl DataChangedEvent {
    pub fn new(key: impl Into<String>, value: impl Into<String>, event_type: ChangeType) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            event_type,
        }
    }

    pub fn added(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, value, ChangeType::Added)
    }

    pub fn updated(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, value, ChangeType::Updated)
    }

    pub fn deleted(key: impl Into<String>) -> Self {
        Self::new(key, String::new(), ChangeType::Deleted)
    }
}
