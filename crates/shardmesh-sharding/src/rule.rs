//! The live sharding rule and its factory.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use shardmesh_core::{DataSourcePoolProperties, Rule, RuleConfiguration};
use shardmesh_mode::{ModeError, Result, RuleBuildContext, RuleFactory};
use tracing::debug;

use crate::config::{
    KeyGenerateStrategyConfiguration, RULE_TYPE, ShardingAuditStrategyConfiguration,
    ShardingRuleConfiguration, ShardingStrategyConfiguration,
};
use crate::error::ShardingError;
use crate::expr;

/// One physical table in one storage unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataNode {
    pub storage_unit: String,
    pub table: String,
}

impl DataNode {
    pub fn new(storage_unit: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            storage_unit: storage_unit.into(),
            table: table.into(),
        }
    }

    /// Parse `storage_unit.table`.
    pub fn parse(text: &str) -> std::result::Result<Self, ShardingError> {
        match text.split_once('.') {
            Some((unit, table)) if !unit.is_empty() && !table.is_empty() && !table.contains('.') => {
                Ok(Self::new(unit, table))
            }
            _ => Err(ShardingError::InvalidDataNode(text.to_string())),
        }
    }
}

impl fmt::Display for DataNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.storage_unit, self.table)
    }
}

/// Resolved routing metadata of one logic table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRule {
    pub logic_table: String,
    pub data_nodes: Vec<DataNode>,
    pub database_strategy: Option<ShardingStrategyConfiguration>,
    pub table_strategy: Option<ShardingStrategyConfiguration>,
    pub key_generate_strategy: Option<KeyGenerateStrategyConfiguration>,
    pub audit_strategy: Option<ShardingAuditStrategyConfiguration>,
}

impl TableRule {
    /// Storage units this table spans, in data node order.
    pub fn storage_units(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.data_nodes
            .iter()
            .map(|node| node.storage_unit.as_str())
            .filter(|unit| seen.insert(*unit))
            .collect()
    }
}

/// Sharding rule of one database.
pub struct ShardingRule {
    database: String,
    configuration: Arc<ShardingRuleConfiguration>,
    table_rules: IndexMap<String, TableRule>,
    binding_groups: Vec<Vec<String>>,
    worker_id: Option<u32>,
}

impl ShardingRule {
    /// Resolve `configuration` against the storage units of `database`.
    pub fn new(
        database: &str,
        configuration: ShardingRuleConfiguration,
        storage_units: &IndexMap<String, DataSourcePoolProperties>,
    ) -> std::result::Result<Self, ShardingError> {
        check_algorithms(&configuration)?;

        let mut table_rules = IndexMap::new();
        for (name, table) in &configuration.tables {
            let data_nodes = if table.actual_data_nodes.is_empty() {
                storage_units
                    .keys()
                    .map(|unit| DataNode::new(unit, &table.logic_table))
                    .collect()
            } else {
                expr::expand(&table.actual_data_nodes)?
                    .iter()
                    .map(|node| DataNode::parse(node))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };
            let rule = TableRule {
                logic_table: table.logic_table.clone(),
                data_nodes,
                database_strategy: table
                    .database_strategy
                    .clone()
                    .or_else(|| configuration.default_database_sharding_strategy.clone()),
                table_strategy: table
                    .table_strategy
                    .clone()
                    .or_else(|| configuration.default_table_sharding_strategy.clone()),
                key_generate_strategy: table
                    .key_generate_strategy
                    .clone()
                    .or_else(|| configuration.default_key_generate_strategy.clone()),
                audit_strategy: table
                    .audit_strategy
                    .clone()
                    .or_else(|| configuration.default_audit_strategy.clone()),
            };
            insert_table(&mut table_rules, name, rule)?;
        }

        for (name, table) in &configuration.auto_tables {
            let data_nodes = expr::expand(&table.actual_data_sources)?
                .into_iter()
                .enumerate()
                .map(|(idx, unit)| DataNode::new(unit, format!("{}_{idx}", table.logic_table)))
                .collect();
            let rule = TableRule {
                logic_table: table.logic_table.clone(),
                data_nodes,
                database_strategy: None,
                table_strategy: table.sharding_strategy.clone(),
                key_generate_strategy: table
                    .key_generate_strategy
                    .clone()
                    .or_else(|| configuration.default_key_generate_strategy.clone()),
                audit_strategy: table
                    .audit_strategy
                    .clone()
                    .or_else(|| configuration.default_audit_strategy.clone()),
            };
            insert_table(&mut table_rules, name, rule)?;
        }

        for (name, rule) in &table_rules {
            if let Some(node) = rule
                .data_nodes
                .iter()
                .find(|node| !storage_units.contains_key(&node.storage_unit))
            {
                return Err(ShardingError::UnknownStorageUnit {
                    table: name.clone(),
                    storage_unit: node.storage_unit.clone(),
                });
            }
        }

        let mut binding_groups = Vec::new();
        for (name, group) in &configuration.binding_table_groups {
            let tables: Vec<String> = group.tables().map(str::to_string).collect();
            if let Some(missing) = tables.iter().find(|t| !table_rules.contains_key(*t)) {
                return Err(ShardingError::UnknownBindingTable {
                    group: name.clone(),
                    table: missing.clone(),
                });
            }
            binding_groups.push(tables);
        }

        Ok(Self {
            database: database.to_string(),
            configuration: Arc::new(configuration),
            table_rules,
            binding_groups,
            worker_id: None,
        })
    }

    /// Worker id of the node the rule lives on, seeding generated keys.
    pub fn with_worker_id(mut self, worker_id: Option<u32>) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn worker_id(&self) -> Option<u32> {
        self.worker_id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn sharding_configuration(&self) -> &ShardingRuleConfiguration {
        &self.configuration
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_rules.get(logic_table)
    }

    pub fn table_rules(&self) -> impl Iterator<Item = &TableRule> {
        self.table_rules.values()
    }

    pub fn is_sharding_table(&self, logic_table: &str) -> bool {
        self.table_rules.contains_key(logic_table)
    }

    pub fn data_nodes(&self, logic_table: &str) -> &[DataNode] {
        self.table_rules
            .get(logic_table)
            .map(|rule| rule.data_nodes.as_slice())
            .unwrap_or_default()
    }

    /// Tables bound to `logic_table`, including itself.
    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        self.binding_groups
            .iter()
            .find(|group| group.iter().any(|t| t == logic_table))
            .map(Vec::as_slice)
    }

    /// Every storage unit referenced by any table.
    pub fn storage_units(&self) -> BTreeSet<&str> {
        self.table_rules
            .values()
            .flat_map(|rule| rule.data_nodes.iter().map(|node| node.storage_unit.as_str()))
            .collect()
    }

    pub fn default_sharding_column(&self) -> Option<&str> {
        self.configuration.default_sharding_column.as_deref()
    }
}

impl Rule for ShardingRule {
    fn configuration(&self) -> Arc<dyn RuleConfiguration> {
        self.configuration.clone()
    }
}

impl fmt::Debug for ShardingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardingRule")
            .field("database", &self.database)
            .field("tables", &self.table_rules.keys().collect::<Vec<_>>())
            .field("binding_groups", &self.binding_groups)
            .field("worker_id", &self.worker_id)
            .finish()
    }
}

fn insert_table(
    table_rules: &mut IndexMap<String, TableRule>,
    name: &str,
    rule: TableRule,
) -> std::result::Result<(), ShardingError> {
    if table_rules.insert(name.to_string(), rule).is_some() {
        return Err(ShardingError::DuplicateTable(name.to_string()));
    }
    Ok(())
}

fn check_algorithms(config: &ShardingRuleConfiguration) -> std::result::Result<(), ShardingError> {
    let check_strategy = |owner: &str, strategy: Option<&ShardingStrategyConfiguration>| {
        match strategy.and_then(ShardingStrategyConfiguration::algorithm_name) {
            Some(name) if !config.sharding_algorithms.contains_key(name) => Err(
                ShardingError::unknown_algorithm(owner, "sharding algorithm", name),
            ),
            _ => Ok(()),
        }
    };
    let check_key_generate = |owner: &str, strategy: Option<&KeyGenerateStrategyConfiguration>| {
        match strategy {
            Some(s) if !config.key_generators.contains_key(&s.key_generator_name) => Err(
                ShardingError::unknown_algorithm(owner, "key generator", &s.key_generator_name),
            ),
            _ => Ok(()),
        }
    };
    let check_audit = |owner: &str, strategy: Option<&ShardingAuditStrategyConfiguration>| {
        let missing = strategy
            .into_iter()
            .flat_map(|s| s.auditor_names.iter())
            .find(|name| !config.auditors.contains_key(*name));
        match missing {
            Some(name) => Err(ShardingError::unknown_algorithm(owner, "auditor", name)),
            None => Ok(()),
        }
    };

    check_strategy("default", config.default_database_sharding_strategy.as_ref())?;
    check_strategy("default", config.default_table_sharding_strategy.as_ref())?;
    check_key_generate("default", config.default_key_generate_strategy.as_ref())?;
    check_audit("default", config.default_audit_strategy.as_ref())?;
    for (name, table) in &config.tables {
        check_strategy(name, table.database_strategy.as_ref())?;
        check_strategy(name, table.table_strategy.as_ref())?;
        check_key_generate(name, table.key_generate_strategy.as_ref())?;
        check_audit(name, table.audit_strategy.as_ref())?;
    }
    for (name, table) in &config.auto_tables {
        check_strategy(name, table.sharding_strategy.as_ref())?;
        check_key_generate(name, table.key_generate_strategy.as_ref())?;
        check_audit(name, table.audit_strategy.as_ref())?;
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ShardingRuleFactory;

impl ShardingRuleFactory {
    pub fn new() -> Self {
        Self
    }
}

impl RuleFactory for ShardingRuleFactory {
    fn rule_type(&self) -> &str {
        RULE_TYPE
    }

    fn build(
        &self,
        context: &RuleBuildContext<'_>,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<Vec<Arc<dyn Rule>>> {
        let config = config
            .downcast_ref::<ShardingRuleConfiguration>()
            .cloned()
            .ok_or_else(|| ModeError::unexpected_configuration(RULE_TYPE))?;
        let worker_id = context.instance.instance().worker_id;
        let rule = ShardingRule::new(context.database, config, context.storage_units)?
            .with_worker_id(worker_id);
        debug!(
            database = %context.database,
            tables = rule.table_rules.len(),
            worker_id = ?worker_id,
            "Built sharding rule"
        );
        let rule: Arc<dyn Rule> = Arc::new(rule);
        Ok(vec![rule])
    }
}
