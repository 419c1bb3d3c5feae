//! # shardmesh-repository
//!
//! The hierarchical, watchable key-value store every compute node shares.
//!
//! Only the client contract ([`RepositoryClient`]) lives here together with
//! [`MemoryRepository`], a single-process implementation used by standalone
//! nodes and tests. Remote repositories implement the same trait elsewhere.
//!
//! Paths are absolute and `/`-separated. Persisting a path implicitly creates
//! its missing parents; deleting a path removes its whole subtree.

mod error;
mod memory;

use async_trait::async_trait;
use shardmesh_core::DataChangedEvent;
use tokio::sync::mpsc;

pub use error::RepositoryError;
pub use memory::MemoryRepository;

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Trait for repository clients.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Name of this repository type (for logging and debugging)
    fn name(&self) -> &str;

    /// Value stored at `key`, or `None` when the node does not exist.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Names of the direct children of `key`, in implementation-defined order.
    async fn get_children(&self, key: &str) -> Result<Vec<String>>;

    /// Create or overwrite the node at `key`.
    async fn persist(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key` and everything below it. Missing keys are ignored.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Whether a node exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Start watching the subtree under `prefix`.
    ///
    /// Changes are delivered through `tx` in the order the repository applied
    /// them, until the returned handle is stopped or the receiver is dropped.
    async fn watch(&self, prefix: &str, tx: mpsc::Sender<DataChangedEvent>) -> Result<WatchHandle>;
}

/// Handle for a running watcher
pub struct WatchHandle {
    /// Task handle for the watcher
    handle: tokio::task::JoinHandle<()>,
    /// Shutdown signal
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl WatchHandle {
    /// Create a new watch handle
    pub fn new(
        handle: tokio::task::JoinHandle<()>,
        shutdown: tokio::sync::oneshot::Sender<()>,
    ) -> Self {
        Self { handle, shutdown }
    }

    /// Stop the watcher
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.handle.await;
    }
}

/// Join path segments onto a base path.
pub fn join_path(base: &str, segment: &str) -> String {
    if segment.is_empty() {
        base.to_string()
    } else if base.ends_with('/') {
        format!("{base}{segment}")
    } else {
        format!("{base}/{segment}")
    }
}
