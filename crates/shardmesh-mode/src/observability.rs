//! Process-wide tracing subscriber whose filter follows the `log-level`
//! cluster property.

use std::sync::OnceLock;

use shardmesh_core::{ConfigurationProperties, PropertyKey};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::global::PropertiesChangedListener;

static FILTER_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Install the global subscriber with `level` as filter unless `RUST_LOG` is set.
///
/// Returns `false` when another subscriber was already installed; the filter
/// then stays out of reach of [`apply_logging_level`].
pub fn init_tracing_with_level(level: &str) -> bool {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();
    if installed {
        let _ = FILTER_HANDLE.set(handle);
    }
    installed
}

/// Swap the active filter. Returns whether the new filter took effect.
pub fn apply_logging_level(level: &str) -> bool {
    let filter = match EnvFilter::try_new(level) {
        Ok(filter) => filter,
        Err(e) => {
            warn!(level = %level, error = %e, "Ignoring invalid log level");
            return false;
        }
    };
    let Some(handle) = FILTER_HANDLE.get() else {
        return false;
    };
    match handle.reload(filter) {
        Ok(()) => {
            info!(level = %level, "Log level changed");
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to reload log filter");
            false
        }
    }
}

/// Follows `log-level` property changes published by the cluster.
#[derive(Debug, Default)]
pub struct LogLevelListener;

impl LogLevelListener {
    /// Apply the level already present in `props`, if any.
    pub fn apply_current(&self, props: &ConfigurationProperties) -> bool {
        props
            .get(PropertyKey::LogLevel.key())
            .is_some_and(apply_logging_level)
    }
}

impl PropertiesChangedListener for LogLevelListener {
    fn name(&self) -> &str {
        "log_level"
    }

    fn watched_keys(&self) -> Vec<String> {
        vec![PropertyKey::LogLevel.key().to_string()]
    }

    fn on_properties_changed(&self, props: &ConfigurationProperties, _changed_keys: &[String]) {
        let level = props
            .value::<String>(PropertyKey::LogLevel)
            .unwrap_or_else(|_| PropertyKey::LogLevel.default_value().to_string());
        apply_logging_level(&level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_follows_property() {
        assert!(!apply_logging_level("shardmesh=loud"));

        init_tracing_with_level("warn");
        assert!(FILTER_HANDLE.get().is_some());
        assert!(apply_logging_level("debug"));
        assert!(!apply_logging_level("shardmesh=loud"));

        let listener = LogLevelListener;
        assert_eq!(listener.watched_keys(), vec!["log-level"]);
        assert!(listener.apply_current(&ConfigurationProperties::new().with("log-level", "info")));
        assert!(!listener.apply_current(&ConfigurationProperties::new()));
    }
}
