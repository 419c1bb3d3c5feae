//! Rule item processors for the sharding rule.
//!
//! Named items (`auditors/{name}`, `tables/{logic_table}`, ...) are handled by
//! [`NamedItemProcessor`]; single-valued items (`default_table_strategy`, ...)
//! by [`UniqueItemProcessor`].

use std::sync::Arc;

use shardmesh_core::{RuleChangedItemType, RuleConfiguration};
use shardmesh_mode::{Database, ModeError, Result, RuleItemConfigurationChangedProcessor};

use crate::config::{RULE_TYPE, ShardingRuleConfiguration};
use crate::swapper::{decode, item};

/// Kinds of named sharding items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedItem {
    Algorithms,
    KeyGenerators,
    Auditors,
    Tables,
    AutoTables,
    BindingTables,
}

impl NamedItem {
    pub const ALL: [NamedItem; 6] = [
        Self::Algorithms,
        Self::KeyGenerators,
        Self::Auditors,
        Self::Tables,
        Self::AutoTables,
        Self::BindingTables,
    ];

    pub fn item_type(self) -> &'static str {
        match self {
            Self::Algorithms => item::ALGORITHMS,
            Self::KeyGenerators => item::KEY_GENERATORS,
            Self::Auditors => item::AUDITORS,
            Self::Tables => item::TABLES,
            Self::AutoTables => item::AUTO_TABLES,
            Self::BindingTables => item::BINDING_TABLES,
        }
    }
}

/// Kinds of single-valued sharding items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniqueItem {
    DefaultDatabaseStrategy,
    DefaultTableStrategy,
    DefaultKeyGenerateStrategy,
    DefaultAuditStrategy,
    DefaultShardingColumn,
}

impl UniqueItem {
    pub const ALL: [UniqueItem; 5] = [
        Self::DefaultDatabaseStrategy,
        Self::DefaultTableStrategy,
        Self::DefaultKeyGenerateStrategy,
        Self::DefaultAuditStrategy,
        Self::DefaultShardingColumn,
    ];

    pub fn item_type(self) -> &'static str {
        match self {
            Self::DefaultDatabaseStrategy => item::DEFAULT_DATABASE_STRATEGY,
            Self::DefaultTableStrategy => item::DEFAULT_TABLE_STRATEGY,
            Self::DefaultKeyGenerateStrategy => item::DEFAULT_KEY_GENERATE_STRATEGY,
            Self::DefaultAuditStrategy => item::DEFAULT_AUDIT_STRATEGY,
            Self::DefaultShardingColumn => item::DEFAULT_SHARDING_COLUMN,
        }
    }
}

fn sharding_configuration(current: &mut dyn RuleConfiguration) -> Result<&mut ShardingRuleConfiguration> {
    current
        .downcast_mut::<ShardingRuleConfiguration>()
        .ok_or_else(|| ModeError::unexpected_configuration(RULE_TYPE))
}

fn current_configuration(database: &Database) -> Box<dyn RuleConfiguration> {
    Box::new(
        database
            .rules
            .configuration::<ShardingRuleConfiguration>()
            .unwrap_or_default(),
    )
}

#[derive(Debug, Clone, Copy)]
pub struct NamedItemProcessor {
    kind: NamedItem,
}

impl NamedItemProcessor {
    pub fn new(kind: NamedItem) -> Self {
        Self { kind }
    }

    fn require_name<'a>(&self, item_name: Option<&'a str>) -> Result<&'a str> {
        item_name.ok_or_else(|| {
            ModeError::invalid_item(self.kind.item_type(), "named item without a name")
        })
    }
}

impl RuleItemConfigurationChangedProcessor for NamedItemProcessor {
    fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::new(RULE_TYPE, Some(self.kind.item_type()))
    }

    fn find_rule_configuration(&self, database: &Database) -> Box<dyn RuleConfiguration> {
        current_configuration(database)
    }

    fn change_rule_item_configuration(
        &self,
        item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
        content: &str,
    ) -> Result<()> {
        let name = self.require_name(item_name)?.to_string();
        let key = format!("{}/{}", self.kind.item_type(), name);
        let config = sharding_configuration(current)?;
        match self.kind {
            NamedItem::Algorithms => {
                config.sharding_algorithms.insert(name, decode(&key, content)?);
            }
            NamedItem::KeyGenerators => {
                config.key_generators.insert(name, decode(&key, content)?);
            }
            NamedItem::Auditors => {
                config.auditors.insert(name, decode(&key, content)?);
            }
            NamedItem::Tables => {
                config.tables.insert(name, decode(&key, content)?);
            }
            NamedItem::AutoTables => {
                config.auto_tables.insert(name, decode(&key, content)?);
            }
            NamedItem::BindingTables => {
                config.binding_table_groups.insert(name, decode(&key, content)?);
            }
        }
        Ok(())
    }

    fn drop_rule_item_configuration(
        &self,
        item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
    ) -> Result<()> {
        let name = self.require_name(item_name)?;
        let config = sharding_configuration(current)?;
        match self.kind {
            NamedItem::Algorithms => {
                config.sharding_algorithms.shift_remove(name);
            }
            NamedItem::KeyGenerators => {
                config.key_generators.shift_remove(name);
            }
            NamedItem::Auditors => {
                config.auditors.shift_remove(name);
            }
            NamedItem::Tables => {
                config.tables.shift_remove(name);
            }
            NamedItem::AutoTables => {
                config.auto_tables.shift_remove(name);
            }
            NamedItem::BindingTables => {
                config.binding_table_groups.shift_remove(name);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct UniqueItemProcessor {
    kind: UniqueItem,
}

impl UniqueItemProcessor {
    pub fn new(kind: UniqueItem) -> Self {
        Self { kind }
    }
}

impl RuleItemConfigurationChangedProcessor for UniqueItemProcessor {
    fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::new(RULE_TYPE, Some(self.kind.item_type()))
    }

    fn find_rule_configuration(&self, database: &Database) -> Box<dyn RuleConfiguration> {
        current_configuration(database)
    }

    fn change_rule_item_configuration(
        &self,
        _item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
        content: &str,
    ) -> Result<()> {
        let key = self.kind.item_type();
        let config = sharding_configuration(current)?;
        match self.kind {
            UniqueItem::DefaultDatabaseStrategy => {
                config.default_database_sharding_strategy = Some(decode(key, content)?);
            }
            UniqueItem::DefaultTableStrategy => {
                config.default_table_sharding_strategy = Some(decode(key, content)?);
            }
            UniqueItem::DefaultKeyGenerateStrategy => {
                config.default_key_generate_strategy = Some(decode(key, content)?);
            }
            UniqueItem::DefaultAuditStrategy => {
                config.default_audit_strategy = Some(decode(key, content)?);
            }
            UniqueItem::DefaultShardingColumn => {
                config.default_sharding_column = Some(content.to_string());
            }
        }
        Ok(())
    }

    fn drop_rule_item_configuration(
        &self,
        _item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
    ) -> Result<()> {
        let config = sharding_configuration(current)?;
        match self.kind {
            UniqueItem::DefaultDatabaseStrategy => config.default_database_sharding_strategy = None,
            UniqueItem::DefaultTableStrategy => config.default_table_sharding_strategy = None,
            UniqueItem::DefaultKeyGenerateStrategy => config.default_key_generate_strategy = None,
            UniqueItem::DefaultAuditStrategy => config.default_audit_strategy = None,
            UniqueItem::DefaultShardingColumn => config.default_sharding_column = None,
        }
        Ok(())
    }
}

/// One processor per sharding item type.
pub fn processors() -> Vec<Arc<dyn RuleItemConfigurationChangedProcessor>> {
    let named = NamedItem::ALL
        .into_iter()
        .map(|kind| Arc::new(NamedItemProcessor::new(kind)) as Arc<dyn RuleItemConfigurationChangedProcessor>);
    let unique = UniqueItem::ALL
        .into_iter()
        .map(|kind| Arc::new(UniqueItemProcessor::new(kind)) as Arc<dyn RuleItemConfigurationChangedProcessor>);
    named.chain(unique).collect()
}
