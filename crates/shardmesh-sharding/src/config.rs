//! Sharding rule configuration.
//!
//! Named items (algorithms, tables, binding groups) live in insertion-ordered
//! maps so that decomposition into repository tuples is deterministic.

use std::any::Any;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shardmesh_core::RuleConfiguration;

/// Rule type of the sharding feature.
pub const RULE_TYPE: &str = "sharding";

/// A named, typed algorithm with free-form properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub props: IndexMap<String, String>,
}

impl AlgorithmConfiguration {
    pub fn new(algorithm_type: impl Into<String>) -> Self {
        Self {
            algorithm_type: algorithm_type.into(),
            props: IndexMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

/// How rows are assigned to databases or tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardingStrategyConfiguration {
    Standard {
        sharding_column: String,
        sharding_algorithm_name: String,
    },
    Complex {
        /// Comma separated column names.
        sharding_columns: String,
        sharding_algorithm_name: String,
    },
    Hint {
        sharding_algorithm_name: String,
    },
    /// Route to every target.
    None,
}

impl ShardingStrategyConfiguration {
    pub fn standard(column: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self::Standard {
            sharding_column: column.into(),
            sharding_algorithm_name: algorithm.into(),
        }
    }

    /// Name of the referenced sharding algorithm, if the strategy uses one.
    pub fn algorithm_name(&self) -> Option<&str> {
        match self {
            Self::Standard {
                sharding_algorithm_name,
                ..
            }
            | Self::Complex {
                sharding_algorithm_name,
                ..
            }
            | Self::Hint {
                sharding_algorithm_name,
            } => Some(sharding_algorithm_name),
            Self::None => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGenerateStrategyConfiguration {
    pub column: String,
    pub key_generator_name: String,
}

impl KeyGenerateStrategyConfiguration {
    pub fn new(column: impl Into<String>, key_generator_name: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            key_generator_name: key_generator_name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingAuditStrategyConfiguration {
    pub auditor_names: Vec<String>,
    #[serde(default)]
    pub allow_hint_disable: bool,
}

/// A logic table mapped onto explicit data nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingTableRuleConfiguration {
    pub logic_table: String,
    /// Inline expression such as `ds_${0..1}.t_order_${0..3}`. Empty means
    /// one table per storage unit.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub actual_data_nodes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_strategy: Option<ShardingAuditStrategyConfiguration>,
}

impl ShardingTableRuleConfiguration {
    pub fn new(logic_table: impl Into<String>, actual_data_nodes: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_data_nodes: actual_data_nodes.into(),
            ..Self::default()
        }
    }
}

/// A logic table spread automatically over a list of storage units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingAutoTableRuleConfiguration {
    pub logic_table: String,
    /// Comma separated storage unit names or an inline expression.
    pub actual_data_sources: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharding_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_strategy: Option<ShardingAuditStrategyConfiguration>,
}

impl ShardingAutoTableRuleConfiguration {
    pub fn new(logic_table: impl Into<String>, actual_data_sources: impl Into<String>) -> Self {
        Self {
            logic_table: logic_table.into(),
            actual_data_sources: actual_data_sources.into(),
            ..Self::default()
        }
    }
}

/// A group of tables sharded identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingTableReferenceRuleConfiguration {
    pub name: String,
    /// Comma separated logic table names.
    pub reference: String,
}

impl ShardingTableReferenceRuleConfiguration {
    pub fn new(name: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reference: reference.into(),
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.reference.split(',').map(str::trim).filter(|t| !t.is_empty())
    }
}

/// The whole sharding configuration of one database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardingRuleConfiguration {
    #[serde(default)]
    pub tables: IndexMap<String, ShardingTableRuleConfiguration>,
    #[serde(default)]
    pub auto_tables: IndexMap<String, ShardingAutoTableRuleConfiguration>,
    #[serde(default)]
    pub binding_table_groups: IndexMap<String, ShardingTableReferenceRuleConfiguration>,
    #[serde(default)]
    pub default_database_sharding_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default)]
    pub default_table_sharding_strategy: Option<ShardingStrategyConfiguration>,
    #[serde(default)]
    pub default_key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
    #[serde(default)]
    pub default_audit_strategy: Option<ShardingAuditStrategyConfiguration>,
    #[serde(default)]
    pub default_sharding_column: Option<String>,
    #[serde(default)]
    pub sharding_algorithms: IndexMap<String, AlgorithmConfiguration>,
    #[serde(default)]
    pub key_generators: IndexMap<String, AlgorithmConfiguration>,
    #[serde(default)]
    pub auditors: IndexMap<String, AlgorithmConfiguration>,
}

impl ShardingRuleConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, table: ShardingTableRuleConfiguration) {
        self.tables.insert(table.logic_table.clone(), table);
    }

    pub fn add_auto_table(&mut self, table: ShardingAutoTableRuleConfiguration) {
        self.auto_tables.insert(table.logic_table.clone(), table);
    }

    pub fn add_binding_table_group(&mut self, group: ShardingTableReferenceRuleConfiguration) {
        self.binding_table_groups.insert(group.name.clone(), group);
    }
}

impl RuleConfiguration for ShardingRuleConfiguration {
    fn rule_type(&self) -> &str {
        RULE_TYPE
    }

    fn is_empty(&self) -> bool {
        self.tables.is_empty()
            && self.auto_tables.is_empty()
            && self.binding_table_groups.is_empty()
            && self.default_database_sharding_strategy.is_none()
            && self.default_table_sharding_strategy.is_none()
            && self.default_key_generate_strategy.is_none()
            && self.default_audit_strategy.is_none()
            && self.default_sharding_column.is_none()
            && self.sharding_algorithms.is_empty()
            && self.key_generators.is_empty()
            && self.auditors.is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_config(&self) -> Box<dyn RuleConfiguration> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_strategy_round_trip() {
        let strategy = ShardingStrategyConfiguration::None;
        let stored = serde_json::to_string(&strategy).unwrap();
        assert_eq!(stored, "\"none\"");

        let restored: ShardingStrategyConfiguration = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, strategy);
        assert_eq!(restored.algorithm_name(), None);
    }

    #[test]
    fn test_standard_strategy_format() {
        let strategy = ShardingStrategyConfiguration::standard("user_id", "database_inline");
        let value = serde_json::to_value(&strategy).unwrap();
        assert_eq!(value["standard"]["sharding_column"], "user_id");
        assert_eq!(strategy.algorithm_name(), Some("database_inline"));
    }

    #[test]
    fn test_empty_configuration() {
        let mut config = ShardingRuleConfiguration::new();
        assert!(RuleConfiguration::is_empty(&config));

        config.default_sharding_column = Some("order_id".into());
        assert!(!RuleConfiguration::is_empty(&config));
    }

    #[test]
    fn test_binding_group_tables() {
        let group = ShardingTableReferenceRuleConfiguration::new("foo", "t_order, t_order_item,");
        assert_eq!(group.tables().collect::<Vec<_>>(), vec!["t_order", "t_order_item"]);
    }
}
