use shardmesh_repository::join_path;

/// One decomposed sub-item of a rule configuration.
///
/// `key` is relative to the rule's base path; an empty key addresses the
/// base path itself (a whole-root item).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTuple {
    pub key: String,
    pub value: String,
}

impl RepositoryTuple {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Tuple addressing the base path itself.
    pub fn root(value: impl Into<String>) -> Self {
        Self::new("", value)
    }

    /// Absolute logical key of this tuple under `base`.
    pub fn path(&self, base: &str) -> String {
        join_path(base, &self.key)
    }

    /// First segment of the relative key, if any.
    pub fn item_type(&self) -> Option<&str> {
        self.key.split('/').next().filter(|s| !s.is_empty())
    }

    /// Second segment of the relative key, if any.
    pub fn item_name(&self) -> Option<&str> {
        self.key.split_once('/').map(|(_, name)| name)
    }
}
