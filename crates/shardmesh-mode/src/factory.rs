//! Rule factories, keyed by rule type.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use shardmesh_core::{ConfigurationProperties, DataSourcePoolProperties, Rule, RuleConfiguration};

use crate::instance::InstanceContext;
use crate::snapshot::Database;
use crate::{ModeError, Result};

/// What a database rule factory may read while building.
#[derive(Debug, Clone, Copy)]
pub struct RuleBuildContext<'a> {
    pub database: &'a str,
    pub storage_units: &'a IndexMap<String, DataSourcePoolProperties>,
    /// Rules of the database that stay in place, in order.
    pub existing_rules: &'a [Arc<dyn Rule>],
    pub props: &'a ConfigurationProperties,
    /// This node, e.g. for its worker id or labels.
    pub instance: &'a InstanceContext,
}

/// What a global rule factory may read while building.
#[derive(Debug, Clone, Copy)]
pub struct GlobalRuleBuildContext<'a> {
    pub databases: &'a BTreeMap<String, Arc<Database>>,
    pub existing_rules: &'a [Arc<dyn Rule>],
    pub props: &'a ConfigurationProperties,
    pub instance: &'a InstanceContext,
}

/// Builds live rules from a configuration.
///
/// A factory must not touch the published snapshot; everything it needs is
/// in the context.
pub trait RuleFactory: Send + Sync {
    fn rule_type(&self) -> &str;

    fn build(
        &self,
        context: &RuleBuildContext<'_>,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<Vec<Arc<dyn Rule>>>;

    fn build_global(
        &self,
        _context: &GlobalRuleBuildContext<'_>,
        _config: Arc<dyn RuleConfiguration>,
    ) -> Result<Vec<Arc<dyn Rule>>> {
        Err(ModeError::build(self.rule_type(), "global scope is not supported"))
    }
}

/// Explicit registry of rule factories.
#[derive(Default, Clone)]
pub struct RuleFactoryRegistry {
    factories: IndexMap<String, Arc<dyn RuleFactory>>,
}

impl RuleFactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory, replacing any previous one for the same rule type.
    pub fn register(&mut self, factory: Arc<dyn RuleFactory>) {
        self.factories.insert(factory.rule_type().to_string(), factory);
    }

    pub fn with(mut self, factory: Arc<dyn RuleFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn get(&self, rule_type: &str) -> Option<&Arc<dyn RuleFactory>> {
        self.factories.get(rule_type)
    }

    pub fn require(&self, rule_type: &str) -> Result<&Arc<dyn RuleFactory>> {
        self.get(rule_type)
            .ok_or_else(|| ModeError::FactoryNotFound(rule_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl std::fmt::Debug for RuleFactoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleFactoryRegistry")
            .field("rule_types", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Build every rule of a database from scratch, one configuration after
/// another. Each factory sees the rules built before it.
pub fn build_database_rules(
    factories: &RuleFactoryRegistry,
    instance: &InstanceContext,
    database: &str,
    storage_units: &IndexMap<String, DataSourcePoolProperties>,
    configs: &[Arc<dyn RuleConfiguration>],
    props: &ConfigurationProperties,
) -> Result<Vec<Arc<dyn Rule>>> {
    let mut rules: Vec<Arc<dyn Rule>> = Vec::new();
    for config in configs {
        let factory = factories.require(config.rule_type())?;
        let context = RuleBuildContext {
            database,
            storage_units,
            existing_rules: &rules,
            props,
            instance,
        };
        let built = factory.build(&context, config.clone())?;
        rules.extend(built);
    }
    Ok(rules)
}

/// Build every global rule from scratch.
pub fn build_global_rules(
    factories: &RuleFactoryRegistry,
    instance: &InstanceContext,
    databases: &BTreeMap<String, Arc<Database>>,
    configs: &[Arc<dyn RuleConfiguration>],
    props: &ConfigurationProperties,
) -> Result<Vec<Arc<dyn Rule>>> {
    let mut rules: Vec<Arc<dyn Rule>> = Vec::new();
    for config in configs {
        let factory = factories.require(config.rule_type())?;
        let context = GlobalRuleBuildContext {
            databases,
            existing_rules: &rules,
            props,
            instance,
        };
        let built = factory.build_global(&context, config.clone())?;
        rules.extend(built);
    }
    Ok(rules)
}
