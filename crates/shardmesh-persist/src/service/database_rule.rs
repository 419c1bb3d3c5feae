use std::collections::HashSet;
use std::sync::Arc;

use shardmesh_core::RuleConfiguration;
use tracing::{debug, warn};

use crate::node_path::{self, RuleItemPath};
use crate::store::VersionedConfigStore;
use crate::swapper::SwapperRegistry;
use crate::version::MetaDataVersion;
use crate::Result;

/// Persists per-database rule configurations through their swappers.
#[derive(Debug, Clone)]
pub struct DatabaseRulePersistService {
    store: Arc<VersionedConfigStore>,
    swappers: Arc<SwapperRegistry>,
}

impl DatabaseRulePersistService {
    pub fn new(store: Arc<VersionedConfigStore>, swappers: Arc<SwapperRegistry>) -> Self {
        Self { store, swappers }
    }

    /// Persist `config` item by item.
    ///
    /// Items that exist in the repository but not in `config` are deleted
    /// first; their tombstones are appended to the returned receipts. New
    /// versions still need to be activated by the caller.
    pub async fn persist(
        &self,
        database: &str,
        config: &dyn RuleConfiguration,
    ) -> Result<Vec<MetaDataVersion>> {
        let swapper = self.swappers.require(config.rule_type())?;
        let base = node_path::database_rule(database, config.rule_type());
        let tuples = swapper.swap_to_tuples(config)?;

        let wanted: HashSet<&str> = tuples.iter().map(|t| t.key.as_str()).collect();
        let stale: Vec<_> = self
            .store
            .load_tuples(&base)
            .await?
            .into_iter()
            .filter(|t| !wanted.contains(t.key.as_str()))
            .collect();
        let tombstones = self.store.delete_tuples(&base, &stale).await?;

        let mut receipts = self.store.persist_tuples(&base, &tuples).await?;
        debug!(
            database = %database,
            rule_type = %config.rule_type(),
            items = receipts.len(),
            removed = tombstones.len(),
            "Persisted database rule configuration"
        );
        receipts.extend(tombstones);
        Ok(receipts)
    }

    /// Load every rule configuration of `database` that has a registered swapper.
    pub async fn load_all(&self, database: &str) -> Result<Vec<Arc<dyn RuleConfiguration>>> {
        let root = node_path::database_rules(database);
        let mut configs = Vec::new();
        for rule_type in self.store.repository().get_children(&root).await? {
            if self.swappers.get(&rule_type).is_none() {
                warn!(database = %database, rule_type = %rule_type, "Skipping rule type without swapper");
                continue;
            }
            if let Some(config) = self.load(database, &rule_type).await? {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    /// Load one rule configuration of `database`.
    pub async fn load(
        &self,
        database: &str,
        rule_type: &str,
    ) -> Result<Option<Arc<dyn RuleConfiguration>>> {
        let swapper = self.swappers.require(rule_type)?;
        let tuples = self
            .store
            .load_tuples(&node_path::database_rule(database, rule_type))
            .await?;
        if tuples.is_empty() {
            return Ok(None);
        }
        Ok(swapper.swap_to_object(&tuples)?.map(Arc::from))
    }

    /// Active content of a single rule item.
    pub async fn load_item(&self, item: &RuleItemPath) -> Result<Option<String>> {
        self.store.load(&item.key()).await
    }

    /// Delete the items `config` decomposes into, last item first.
    pub async fn delete_items(
        &self,
        database: &str,
        config: &dyn RuleConfiguration,
    ) -> Result<Vec<MetaDataVersion>> {
        let swapper = self.swappers.require(config.rule_type())?;
        let tuples = swapper.swap_to_tuples(config)?;
        self.store
            .delete_tuples(&node_path::database_rule(database, config.rule_type()), &tuples)
            .await
    }

    /// Delete a whole rule type of `database`.
    pub async fn delete(&self, database: &str, rule_type: &str) -> Result<MetaDataVersion> {
        self.store
            .delete(&node_path::database_rule(database, rule_type))
            .await
    }
}
