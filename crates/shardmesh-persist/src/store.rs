//! Versioned configuration store.
//!
//! Each logical key `K` owns an append-only list of versions under
//! `K/versions/{n}` and one mutable pointer `K/active_version`. The first
//! persist activates version 0; later persists only append, and a caller has
//! to activate the new version explicitly.

use std::sync::Arc;

use shardmesh_repository::{RepositoryClient, join_path};
use tracing::{debug, info};

use crate::error::PersistError;
use crate::node_path::{self, ACTIVE_VERSION, VERSIONS};
use crate::tuple::RepositoryTuple;
use crate::version::{DEFAULT_VERSION, MetaDataVersion};
use crate::Result;

/// Version-aware access to a repository.
#[derive(Clone)]
pub struct VersionedConfigStore {
    repository: Arc<dyn RepositoryClient>,
}

impl VersionedConfigStore {
    pub fn new(repository: Arc<dyn RepositoryClient>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<dyn RepositoryClient> {
        &self.repository
    }

    /// Append `content` as the next version of `key`.
    ///
    /// The active pointer is only written when it was unset, in which case it
    /// points at the default version.
    pub async fn persist(&self, key: &str, content: &str) -> Result<MetaDataVersion> {
        let existing = self.versions(key).await?;
        let next = existing.first().map_or(DEFAULT_VERSION, |latest| latest + 1);
        self.repository
            .persist(&node_path::version(key, next), content)
            .await?;

        let previous = self.active_version(key).await?;
        if previous.is_none() {
            self.repository
                .persist(&node_path::active_version(key), &DEFAULT_VERSION.to_string())
                .await?;
        }
        debug!(key = %key, version = next, previous_active = ?previous, "Persisted configuration version");
        Ok(MetaDataVersion::new(key, previous, next))
    }

    /// Content of the active version, or `None` when nothing is active or the
    /// content is empty.
    pub async fn load(&self, key: &str) -> Result<Option<String>> {
        match self.active_version(key).await? {
            Some(version) => self.load_version(key, version).await,
            None => Ok(None),
        }
    }

    /// Content of an explicit version.
    pub async fn load_version(&self, key: &str, version: u64) -> Result<Option<String>> {
        let content = self
            .repository
            .get(&node_path::version(key, version))
            .await?;
        Ok(content.filter(|c| !c.is_empty()))
    }

    /// Currently active version of `key`.
    pub async fn active_version(&self, key: &str) -> Result<Option<u64>> {
        let path = node_path::active_version(key);
        let Some(raw) = self.repository.get(&path).await? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<u64>()
            .map(Some)
            .map_err(|_| PersistError::corruption(path, format!("malformed active version '{raw}'")))
    }

    /// All versions of `key`, most recent first.
    pub async fn versions(&self, key: &str) -> Result<Vec<u64>> {
        let path = node_path::versions(key);
        let mut versions = self
            .repository
            .get_children(&path)
            .await?
            .into_iter()
            .map(|name| {
                name.parse::<u64>().map_err(|_| {
                    PersistError::corruption(&path, format!("malformed version folder '{name}'"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        versions.sort_unstable_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    /// Point `key` at an existing version.
    pub async fn switch_active_version(&self, key: &str, version: u64) -> Result<()> {
        if self.active_version(key).await? == Some(version) {
            return Ok(());
        }
        if !self.versions(key).await?.contains(&version) {
            return Err(PersistError::corruption(
                key,
                format!("cannot activate missing version {version}"),
            ));
        }
        self.repository
            .persist(&node_path::active_version(key), &version.to_string())
            .await?;
        info!(key = %key, version, "Switched active version");
        Ok(())
    }

    /// Remove the whole logical subtree of `key`.
    pub async fn delete(&self, key: &str) -> Result<MetaDataVersion> {
        let previous = self.active_version(key).await?;
        self.repository.delete(key).await?;
        debug!(key = %key, previous_active = ?previous, "Deleted configuration");
        Ok(MetaDataVersion::tombstone(key, previous))
    }

    /// Persist every tuple under `base`, in order.
    pub async fn persist_tuples(
        &self,
        base: &str,
        tuples: &[RepositoryTuple],
    ) -> Result<Vec<MetaDataVersion>> {
        let mut receipts = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            receipts.push(self.persist(&tuple.path(base), &tuple.value).await?);
        }
        Ok(receipts)
    }

    /// Delete every tuple under `base` in reverse order, so an item is gone
    /// before anything it references.
    pub async fn delete_tuples(
        &self,
        base: &str,
        tuples: &[RepositoryTuple],
    ) -> Result<Vec<MetaDataVersion>> {
        let mut receipts = Vec::with_capacity(tuples.len());
        for tuple in tuples.iter().rev() {
            receipts.push(self.delete(&tuple.path(base)).await?);
        }
        Ok(receipts)
    }

    /// Activate the versions written by a batch, in batch order.
    pub async fn switch_active_versions(&self, receipts: &[MetaDataVersion]) -> Result<()> {
        for receipt in receipts {
            if let Some(version) = receipt.new_version
                && receipt.previous_active_version != Some(version)
            {
                self.switch_active_version(&receipt.path, version).await?;
            }
        }
        Ok(())
    }

    /// Walk the subtree under `base` and load one tuple per logical key that
    /// has an active version. Keys are relative to `base`.
    pub async fn load_tuples(&self, base: &str) -> Result<Vec<RepositoryTuple>> {
        let mut tuples = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(relative) = pending.pop() {
            let path = join_path(base, &relative);
            let children = self.repository.get_children(&path).await?;
            if children.iter().any(|c| c == ACTIVE_VERSION)
                && let Some(content) = self.load(&path).await?
            {
                tuples.push(RepositoryTuple::new(relative.as_str(), content));
            }
            // Reverse push keeps repository order when popping.
            for child in children
                .iter()
                .rev()
                .filter(|c| c.as_str() != VERSIONS && c.as_str() != ACTIVE_VERSION)
            {
                pending.push(if relative.is_empty() {
                    child.clone()
                } else {
                    format!("{relative}/{child}")
                });
            }
        }
        Ok(tuples)
    }
}

impl std::fmt::Debug for VersionedConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedConfigStore")
            .field("repository", &self.repository.name())
            .finish()
    }
}
