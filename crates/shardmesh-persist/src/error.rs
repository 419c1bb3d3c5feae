//! Persistence error types.

use shardmesh_repository::RepositoryError;

/// Errors that can occur while reading or writing versioned configuration.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// The underlying repository failed.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Stored data violates the layout contract. Not retried.
    #[error("Configuration corrupted at {key}: {message}")]
    Corruption {
        /// Path of the offending node.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// Content could not be converted to or from the storage format.
    #[error("Serialization error at {key}: {source}")]
    Serialization {
        /// Path of the offending node.
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// No swapper is registered for the rule type.
    #[error("No swapper registered for rule type '{0}'")]
    SwapperNotFound(String),

    /// A swapper was handed a configuration of another type.
    #[error("Unexpected configuration for rule type '{0}'")]
    UnexpectedConfiguration(String),

    /// All worker ids are taken.
    #[error("No free worker id left for instance {0}")]
    WorkerIdExhausted(String),
}

impl PersistError {
    /// Creates a new `Corruption` error.
    #[must_use]
    pub fn corruption(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corruption {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(key: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Serialization {
            key: key.into(),
            source,
        }
    }

    /// Whether retrying the operation cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Corruption { .. } | Self::Serialization { .. } | Self::UnexpectedConfiguration(_)
        )
    }
}
