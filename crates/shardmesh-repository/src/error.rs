/// Errors raised by repository clients.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// The key is not a valid absolute path.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The repository could not be reached or refused the operation.
    #[error("Repository unavailable: {0}")]
    Unavailable(String),

    /// A watcher could not be started.
    #[error("Watch error: {0}")]
    Watch(String),
}

impl RepositoryError {
    #[must_use]
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey(key.into())
    }

    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    #[must_use]
    pub fn watch(msg: impl Into<String>) -> Self {
        Self::Watch(msg.into())
    }
}
