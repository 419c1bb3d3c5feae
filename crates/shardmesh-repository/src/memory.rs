//! In-memory repository.
//!
//! Nodes live in an ordered map so children come back sorted by name. Every
//! mutation is broadcast while the write lock is held, which keeps the event
//! order identical to the order mutations were applied.

use std::collections::BTreeMap;

use async_trait::async_trait;
use shardmesh_core::DataChangedEvent;
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::{RepositoryClient, RepositoryError, Result, WatchHandle};

/// Default buffer size for the change channel.
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Single-process repository backed by a `BTreeMap`.
#[derive(Debug)]
pub struct MemoryRepository {
    data: RwLock<BTreeMap<String, String>>,
    events: broadcast::Sender<DataChangedEvent>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a repository whose change channel buffers `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            data: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    /// Number of stored nodes, implicit parents included.
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }

    fn publish(&self, event: DataChangedEvent) {
        // No watcher is a normal state for a standalone node.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key == "/" {
        return Ok(());
    }
    if !key.starts_with('/') || key.ends_with('/') || key.contains("//") {
        return Err(RepositoryError::invalid_key(key));
    }
    Ok(())
}

fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

fn ancestors(key: &str) -> impl Iterator<Item = &str> {
    key.match_indices('/')
        .map(|(idx, _)| idx)
        .filter(|idx| *idx > 0)
        .map(move |idx| &key[..idx])
}

#[async_trait]
impl RepositoryClient for MemoryRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        validate_key(key)?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn get_children(&self, key: &str) -> Result<Vec<String>> {
        validate_key(key)?;
        let prefix = child_prefix(key);
        let data = self.data.read().await;
        Ok(data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let rest = &k[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect())
    }

    async fn persist(&self, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        if key == "/" {
            return Err(RepositoryError::invalid_key(key));
        }
        let mut data = self.data.write().await;
        for parent in ancestors(key) {
            data.entry(parent.to_string()).or_default();
        }
        let previous = data.insert(key.to_string(), value.to_string());
        let event = match previous {
            Some(_) => DataChangedEvent::updated(key, value),
            None => DataChangedEvent::added(key, value),
        };
        debug!(key = %key, event_type = %event.event_type, "Persisted repository node");
        self.publish(event);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        let prefix = child_prefix(key);
        let mut data = self.data.write().await;
        let mut doomed: Vec<String> = data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        if data.contains_key(key) {
            doomed.push(key.to_string());
        }
        // Children before parents.
        doomed.sort_by(|a, b| b.cmp(a));
        for doomed_key in doomed {
            data.remove(&doomed_key);
            self.publish(DataChangedEvent::deleted(doomed_key));
        }
        Ok(())
    }

    async fn watch(&self, prefix: &str, tx: mpsc::Sender<DataChangedEvent>) -> Result<WatchHandle> {
        validate_key(prefix)?;
        let prefix = prefix.to_string();
        let mut receiver = self.events.subscribe();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        debug!(prefix = %prefix, "Repository watcher stopped");
                        break;
                    }
                    received = receiver.recv() => match received {
                        Ok(event) => {
                            if !event.key.starts_with(&prefix) {
                                continue;
                            }
                            if tx.send(event).await.is_err() {
                                debug!(prefix = %prefix, "Watch receiver dropped, stopping watcher");
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(prefix = %prefix, missed = n, "Repository watcher lagged, missed events");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(WatchHandle::new(handle, shutdown_tx))
    }
}
