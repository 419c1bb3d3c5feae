//! Sharding rule errors.

use shardmesh_mode::ModeError;

use crate::config::RULE_TYPE;

/// Errors raised while validating a sharding configuration or expanding
/// its data nodes.
#[derive(Debug, thiserror::Error)]
pub enum ShardingError {
    #[error("Invalid inline expression '{expression}': {message}")]
    InvalidExpression { expression: String, message: String },

    #[error("Invalid data node '{0}', expected '<storage_unit>.<table>'")]
    InvalidDataNode(String),

    #[error("Table '{table}' references unknown storage unit '{storage_unit}'")]
    UnknownStorageUnit { table: String, storage_unit: String },

    #[error("'{owner}' references unknown {kind} '{name}'")]
    UnknownAlgorithm {
        owner: String,
        kind: &'static str,
        name: String,
    },

    #[error("Binding table group '{group}' references unknown table '{table}'")]
    UnknownBindingTable { group: String, table: String },

    #[error("Table '{0}' is configured more than once")]
    DuplicateTable(String),
}

impl ShardingError {
    /// Creates a new `InvalidExpression` error.
    #[must_use]
    pub fn invalid_expression(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownAlgorithm` error.
    #[must_use]
    pub fn unknown_algorithm(
        owner: impl Into<String>,
        kind: &'static str,
        name: impl Into<String>,
    ) -> Self {
        Self::UnknownAlgorithm {
            owner: owner.into(),
            kind,
            name: name.into(),
        }
    }
}

impl From<ShardingError> for ModeError {
    fn from(err: ShardingError) -> Self {
        ModeError::build(RULE_TYPE, err.to_string())
    }
}
