use std::sync::Arc;

use shardmesh_core::RuleConfiguration;
use tracing::warn;

use crate::node_path::{self, GLOBAL_RULES_ROOT};
use crate::store::VersionedConfigStore;
use crate::swapper::SwapperRegistry;
use crate::version::MetaDataVersion;
use crate::Result;

/// Persists cluster-wide rule configurations under `/rules`.
#[derive(Debug, Clone)]
pub struct GlobalRulePersistService {
    store: Arc<VersionedConfigStore>,
    swappers: Arc<SwapperRegistry>,
}

impl GlobalRulePersistService {
    pub fn new(store: Arc<VersionedConfigStore>, swappers: Arc<SwapperRegistry>) -> Self {
        Self { store, swappers }
    }

    pub async fn persist(&self, config: &dyn RuleConfiguration) -> Result<Vec<MetaDataVersion>> {
        let swapper = self.swappers.require(config.rule_type())?;
        let tuples = swapper.swap_to_tuples(config)?;
        self.store
            .persist_tuples(&node_path::global_rule(config.rule_type()), &tuples)
            .await
    }

    pub async fn load_all(&self) -> Result<Vec<Arc<dyn RuleConfiguration>>> {
        let mut configs = Vec::new();
        for rule_type in self.store.repository().get_children(GLOBAL_RULES_ROOT).await? {
            if self.swappers.get(&rule_type).is_none() {
                warn!(rule_type = %rule_type, "Skipping global rule type without swapper");
                continue;
            }
            if let Some(config) = self.load(&rule_type).await? {
                configs.push(config);
            }
        }
        Ok(configs)
    }

    pub async fn load(&self, rule_type: &str) -> Result<Option<Arc<dyn RuleConfiguration>>> {
        let swapper = self.swappers.require(rule_type)?;
        let tuples = self
            .store
            .load_tuples(&node_path::global_rule(rule_type))
            .await?;
        if tuples.is_empty() {
            return Ok(None);
        }
        Ok(swapper.swap_to_object(&tuples)?.map(Arc::from))
    }
}
