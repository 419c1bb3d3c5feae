//! Error types shared by the domain model.

/// Errors raised by domain types and rule capabilities.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A property value could not be converted to the requested type.
    #[error("Invalid value '{value}' for property '{key}'")]
    InvalidProperty {
        /// Property key.
        key: String,
        /// Raw value found.
        value: String,
    },

    /// A rule failed to release the resources it owns.
    #[error("Failed to dispose {rule_type} rule: {message}")]
    Dispose {
        /// Rule type of the rule being disposed.
        rule_type: String,
        /// Description of the failure.
        message: String,
    },

    /// Serialization of a domain value failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a new `InvalidProperty` error.
    #[must_use]
    pub fn invalid_property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Creates a new `Dispose` error.
    #[must_use]
    pub fn dispose(rule_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispose {
            rule_type: rule_type.into(),
            message: message.into(),
        }
    }
}
