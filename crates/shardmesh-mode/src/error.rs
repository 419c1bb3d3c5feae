//! Error types for snapshot management and reconciliation.

use shardmesh_persist::PersistError;
use shardmesh_repository::RepositoryError;

/// Errors produced while building, reconciling or publishing metadata.
#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("No rule factory registered for rule type '{0}'")]
    FactoryNotFound(String),

    #[error("No rule item processor registered for '{0}'")]
    ProcessorNotFound(String),

    /// A rule factory rejected a configuration.
    #[error("Failed to build rule '{rule_type}': {message}")]
    Build { rule_type: String, message: String },

    /// Item content could not be applied to a configuration.
    #[error("Invalid rule item '{item}': {message}")]
    InvalidItem { item: String, message: String },

    #[error("Unexpected rule configuration, expected '{expected}'")]
    UnexpectedConfiguration { expected: String },

    #[error("Invalid rule item path '{0}'")]
    InvalidPath(String),

    /// Disposing superseded rules failed. The new snapshot is already published.
    #[error("Failed to dispose {} rule(s) of {scope}: {}", .failures.len(), .failures.join("; "))]
    Dispose { scope: String, failures: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Context of a failed coordinator or manager operation.
    #[error("{operation} failed for '{target}': {source}")]
    OperationFailed {
        operation: String,
        target: String,
        #[source]
        source: Box<ModeError>,
    },
}

impl ModeError {
    /// Creates a new `Build` error.
    #[must_use]
    pub fn build(rule_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Build {
            rule_type: rule_type.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidItem` error.
    #[must_use]
    pub fn invalid_item(item: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidItem {
            item: item.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnexpectedConfiguration` error.
    #[must_use]
    pub fn unexpected_configuration(expected: impl Into<String>) -> Self {
        Self::UnexpectedConfiguration {
            expected: expected.into(),
        }
    }

    /// Wraps `source` with operation context. Already wrapped errors are
    /// returned unchanged.
    #[must_use]
    pub fn operation_failed(
        operation: impl Into<String>,
        target: impl Into<String>,
        source: ModeError,
    ) -> Self {
        if matches!(source, Self::OperationFailed { .. }) {
            return source;
        }
        Self::OperationFailed {
            operation: operation.into(),
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error, skipping operation context.
    pub fn root_cause(&self) -> &ModeError {
        match self {
            Self::OperationFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
