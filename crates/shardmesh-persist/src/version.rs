use serde::{Deserialize, Serialize};

/// First version number allocated for a logical key.
pub const DEFAULT_VERSION: u64 = 0;

/// Change receipt returned by every persist and delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaDataVersion {
    /// Logical key the receipt is about.
    pub path: String,
    /// Active version before the operation.
    pub previous_active_version: Option<u64>,
    /// Version written by the operation; `None` for a delete.
    pub new_version: Option<u64>,
}

impl MetaDataVersion {
    pub fn new(path: impl Into<String>, previous_active_version: Option<u64>, new_version: u64) -> Self {
        Self {
            path: path.into(),
            previous_active_version,
            new_version: Some(new_version),
        }
    }

    pub fn tombstone(path: impl Into<String>, previous_active_version: Option<u64>) -> Self {
        Self {
            path: path.into(),
            previous_active_version,
            new_version: None,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.new_version.is_none()
    }
}
