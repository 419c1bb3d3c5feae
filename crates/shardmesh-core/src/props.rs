//! Cluster-wide configuration properties.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Well-known property keys and their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    SqlShow,
    SqlSimple,
    KernelExecutorSize,
    MaxConnectionsSizePerQuery,
    CheckTableMetadataEnabled,
    ProxyFrontendFlushThreshold,
    LogLevel,
}

impl PropertyKey {
    pub fn all() -> &'static [PropertyKey] {
        &[
            Self::SqlShow,
            Self::SqlSimple,
            Self::KernelExecutorSize,
            Self::MaxConnectionsSizePerQuery,
            Self::CheckTableMetadataEnabled,
            Self::ProxyFrontendFlushThreshold,
            Self::LogLevel,
        ]
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::SqlShow => "sql-show",
            Self::SqlSimple => "sql-simple",
            Self::KernelExecutorSize => "kernel-executor-size",
            Self::MaxConnectionsSizePerQuery => "max-connections-size-per-query",
            Self::CheckTableMetadataEnabled => "check-table-metadata-enabled",
            Self::ProxyFrontendFlushThreshold => "proxy-frontend-flush-threshold",
            Self::LogLevel => "log-level",
        }
    }

    pub fn default_value(&self) -> &'static str {
        match self {
            Self::SqlShow | Self::SqlSimple | Self::CheckTableMetadataEnabled => "false",
            Self::KernelExecutorSize => "0",
            Self::MaxConnectionsSizePerQuery => "1",
            Self::ProxyFrontendFlushThreshold => "128",
            Self::LogLevel => "info",
        }
    }

    /// Parse a key from its persisted name.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|k| k.key() == key)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Ordered string properties shared by the whole cluster.
///
/// Values are kept as raw strings; typed access goes through [`Self::value`]
/// and falls back to the key's default when the property is unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigurationProperties {
    values: IndexMap<String, String>,
}

impl ConfigurationProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Typed value of a well-known property, or its default when unset.
    pub fn value<T: FromStr>(&self, key: PropertyKey) -> Result<T, CoreError> {
        let raw = self.get(key.key()).unwrap_or(key.default_value());
        raw.trim()
            .parse::<T>()
            .map_err(|_| CoreError::invalid_property(key.key(), raw))
    }

    pub fn get_bool(&self, key: PropertyKey) -> Result<bool, CoreError> {
        self.value(key)
    }

    pub fn get_u64(&self, key: PropertyKey) -> Result<u64, CoreError> {
        self.value(key)
    }

    /// Keys whose value differs between `self` and `other`, including keys
    /// present on only one side. Order follows `self` then new keys of `other`.
    pub fn changed_keys(&self, other: &ConfigurationProperties) -> Vec<String> {
        let mut changed: Vec<String> = self
            .values
            .iter()
            .filter(|(k, v)| other.values.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect();
        changed.extend(
            other
                .values
                .keys()
                .filter(|k| !self.values.contains_key(*k))
                .cloned(),
        );
        changed
    }
}

impl FromIterator<(String, String)> for ConfigurationProperties {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
