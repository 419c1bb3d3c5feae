//! Decomposition of [`ShardingRuleConfiguration`] into repository tuples.
//!
//! ```text
//! algorithms/{name}
//! key_generators/{name}
//! auditors/{name}
//! default_database_strategy
//! default_table_strategy
//! default_key_generate_strategy
//! default_audit_strategy
//! default_sharding_column
//! tables/{logic_table}
//! auto_tables/{logic_table}
//! binding_tables/{name}
//! ```
//!
//! Algorithms come first so that deleting in reverse order never leaves a
//! table pointing at a missing algorithm.

use serde::Serialize;
use serde::de::DeserializeOwned;
use shardmesh_core::RuleConfiguration;
use shardmesh_persist::{PersistError, RepositoryTuple, Result, RuleConfigurationSwapper};
use tracing::warn;

use crate::config::{RULE_TYPE, ShardingRuleConfiguration};

/// Relative item keys of the sharding rule.
pub mod item {
    pub const ALGORITHMS: &str = "algorithms";
    pub const KEY_GENERATORS: &str = "key_generators";
    pub const AUDITORS: &str = "auditors";
    pub const DEFAULT_DATABASE_STRATEGY: &str = "default_database_strategy";
    pub const DEFAULT_TABLE_STRATEGY: &str = "default_table_strategy";
    pub const DEFAULT_KEY_GENERATE_STRATEGY: &str = "default_key_generate_strategy";
    pub const DEFAULT_AUDIT_STRATEGY: &str = "default_audit_strategy";
    pub const DEFAULT_SHARDING_COLUMN: &str = "default_sharding_column";
    pub const TABLES: &str = "tables";
    pub const AUTO_TABLES: &str = "auto_tables";
    pub const BINDING_TABLES: &str = "binding_tables";
}

/// Serialize one item value in the storage format.
pub(crate) fn encode<T: Serialize>(key: &str, value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| PersistError::serialization(key, e))
}

/// Parse one stored item value.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, content: &str) -> Result<T> {
    serde_json::from_str(content).map_err(|e| PersistError::serialization(key, e))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShardingRuleConfigurationSwapper;

impl ShardingRuleConfigurationSwapper {
    pub fn new() -> Self {
        Self
    }

    fn named<T: Serialize>(
        tuples: &mut Vec<RepositoryTuple>,
        item_type: &str,
        items: &indexmap::IndexMap<String, T>,
    ) -> Result<()> {
        for (name, value) in items {
            let key = format!("{item_type}/{name}");
            let content = encode(&key, value)?;
            tuples.push(RepositoryTuple::new(key, content));
        }
        Ok(())
    }

    fn unique<T: Serialize>(
        tuples: &mut Vec<RepositoryTuple>,
        item_type: &str,
        value: Option<&T>,
    ) -> Result<()> {
        if let Some(value) = value {
            tuples.push(RepositoryTuple::new(item_type, encode(item_type, value)?));
        }
        Ok(())
    }
}

impl RuleConfigurationSwapper for ShardingRuleConfigurationSwapper {
    fn rule_type(&self) -> &str {
        RULE_TYPE
    }

    fn swap_to_tuples(&self, config: &dyn RuleConfiguration) -> Result<Vec<RepositoryTuple>> {
        let config = config
            .downcast_ref::<ShardingRuleConfiguration>()
            .ok_or_else(|| PersistError::UnexpectedConfiguration(RULE_TYPE.to_string()))?;

        let mut tuples = Vec::new();
        Self::named(&mut tuples, item::ALGORITHMS, &config.sharding_algorithms)?;
        Self::named(&mut tuples, item::KEY_GENERATORS, &config.key_generators)?;
        Self::named(&mut tuples, item::AUDITORS, &config.auditors)?;
        Self::unique(
            &mut tuples,
            item::DEFAULT_DATABASE_STRATEGY,
            config.default_database_sharding_strategy.as_ref(),
        )?;
        Self::unique(
            &mut tuples,
            item::DEFAULT_TABLE_STRATEGY,
            config.default_table_sharding_strategy.as_ref(),
        )?;
        Self::unique(
            &mut tuples,
            item::DEFAULT_KEY_GENERATE_STRATEGY,
            config.default_key_generate_strategy.as_ref(),
        )?;
        Self::unique(
            &mut tuples,
            item::DEFAULT_AUDIT_STRATEGY,
            config.default_audit_strategy.as_ref(),
        )?;
        if let Some(column) = &config.default_sharding_column {
            tuples.push(RepositoryTuple::new(item::DEFAULT_SHARDING_COLUMN, column.clone()));
        }
        Self::named(&mut tuples, item::TABLES, &config.tables)?;
        Self::named(&mut tuples, item::AUTO_TABLES, &config.auto_tables)?;
        Self::named(&mut tuples, item::BINDING_TABLES, &config.binding_table_groups)?;
        Ok(tuples)
    }

    fn swap_to_object(
        &self,
        tuples: &[RepositoryTuple],
    ) -> Result<Option<Box<dyn RuleConfiguration>>> {
        if tuples.is_empty() {
            return Ok(None);
        }

        let mut config = ShardingRuleConfiguration::new();
        for tuple in tuples {
            let key = tuple.key.as_str();
            let content = tuple.value.as_str();
            match (tuple.item_type(), tuple.item_name()) {
                (Some(item::ALGORITHMS), Some(name)) => {
                    config
                        .sharding_algorithms
                        .insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::KEY_GENERATORS), Some(name)) => {
                    config.key_generators.insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::AUDITORS), Some(name)) => {
                    config.auditors.insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::TABLES), Some(name)) => {
                    config.tables.insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::AUTO_TABLES), Some(name)) => {
                    config.auto_tables.insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::BINDING_TABLES), Some(name)) => {
                    config
                        .binding_table_groups
                        .insert(name.to_string(), decode(key, content)?);
                }
                (Some(item::DEFAULT_DATABASE_STRATEGY), None) => {
                    config.default_database_sharding_strategy = Some(decode(key, content)?);
                }
                (Some(item::DEFAULT_TABLE_STRATEGY), None) => {
                    config.default_table_sharding_strategy = Some(decode(key, content)?);
                }
                (Some(item::DEFAULT_KEY_GENERATE_STRATEGY), None) => {
                    config.default_key_generate_strategy = Some(decode(key, content)?);
                }
                (Some(item::DEFAULT_AUDIT_STRATEGY), None) => {
                    config.default_audit_strategy = Some(decode(key, content)?);
                }
                (Some(item::DEFAULT_SHARDING_COLUMN), None) => {
                    config.default_sharding_column = Some(content.to_string());
                }
                _ => warn!(key = %key, "Ignoring unknown sharding rule item"),
            }
        }
        Ok(Some(Box::new(config)))
    }
}
