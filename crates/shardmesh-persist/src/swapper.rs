//! Decomposition of rule configurations into repository tuples.

use std::marker::PhantomData;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use shardmesh_core::RuleConfiguration;

use crate::error::PersistError;
use crate::tuple::RepositoryTuple;
use crate::Result;

/// Converts one rule type between its in-memory form and repository tuples.
pub trait RuleConfigurationSwapper: Send + Sync {
    /// Rule type this swapper handles.
    fn rule_type(&self) -> &str;

    /// Decompose `config` into tuples. The order is the persist order; deletes
    /// walk it backwards.
    fn swap_to_tuples(&self, config: &dyn RuleConfiguration) -> Result<Vec<RepositoryTuple>>;

    /// Rebuild a configuration from previously persisted tuples.
    ///
    /// Returns `None` when the tuples describe nothing.
    fn swap_to_object(&self, tuples: &[RepositoryTuple]) -> Result<Option<Box<dyn RuleConfiguration>>>;
}

/// Swapper for configurations persisted as a single JSON document.
pub struct JsonRuleConfigurationSwapper<T> {
    rule_type: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonRuleConfigurationSwapper<T> {
    pub fn new(rule_type: impl Into<String>) -> Self {
        Self {
            rule_type: rule_type.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> RuleConfigurationSwapper for JsonRuleConfigurationSwapper<T>
where
    T: RuleConfiguration + Serialize + DeserializeOwned,
{
    fn rule_type(&self) -> &str {
        &self.rule_type
    }

    fn swap_to_tuples(&self, config: &dyn RuleConfiguration) -> Result<Vec<RepositoryTuple>> {
        let typed = config
            .downcast_ref::<T>()
            .ok_or_else(|| PersistError::UnexpectedConfiguration(self.rule_type.clone()))?;
        let value = serde_json::to_string(typed)
            .map_err(|e| PersistError::serialization(&self.rule_type, e))?;
        Ok(vec![RepositoryTuple::root(value)])
    }

    fn swap_to_object(&self, tuples: &[RepositoryTuple]) -> Result<Option<Box<dyn RuleConfiguration>>> {
        let Some(tuple) = tuples.iter().find(|t| t.key.is_empty()) else {
            return Ok(None);
        };
        let typed: T = serde_json::from_str(&tuple.value)
            .map_err(|e| PersistError::serialization(&self.rule_type, e))?;
        Ok(Some(Box::new(typed)))
    }
}

/// Registry of swappers keyed by rule type.
#[derive(Default, Clone)]
pub struct SwapperRegistry {
    swappers: IndexMap<String, Arc<dyn RuleConfigurationSwapper>>,
}

impl SwapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a swapper, replacing any previous one for the same rule type.
    pub fn register(&mut self, swapper: Arc<dyn RuleConfigurationSwapper>) {
        self.swappers.insert(swapper.rule_type().to_string(), swapper);
    }

    pub fn with(mut self, swapper: Arc<dyn RuleConfigurationSwapper>) -> Self {
        self.register(swapper);
        self
    }

    pub fn get(&self, rule_type: &str) -> Option<&Arc<dyn RuleConfigurationSwapper>> {
        self.swappers.get(rule_type)
    }

    pub fn require(&self, rule_type: &str) -> Result<&Arc<dyn RuleConfigurationSwapper>> {
        self.get(rule_type)
            .ok_or_else(|| PersistError::SwapperNotFound(rule_type.to_string()))
    }

    pub fn rule_types(&self) -> impl Iterator<Item = &str> {
        self.swappers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.swappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swappers.is_empty()
    }
}

impl std::fmt::Debug for SwapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapperRegistry")
            .field("rule_types", &self.swappers.keys().collect::<Vec<_>>())
            .finish()
    }
}
