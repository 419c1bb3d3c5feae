//! Immutable metadata snapshot and its atomic publication handle.
//!
//! Readers call [`MetaDataHandle::load`] and keep the returned `Arc` for as
//! long as they need a consistent view. Writers never mutate a published
//! snapshot: they derive a new one (sharing every untouched database) and
//! swap it in.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use indexmap::IndexMap;
use shardmesh_core::{ConfigurationProperties, DataSourcePoolProperties, Rule, RuleConfiguration};
use time::OffsetDateTime;

/// Ordered set of live rules.
#[derive(Debug, Clone, Default)]
pub struct RuleMetaData {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleMetaData {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule built from a configuration of the same family as `config`.
    pub fn find_built_from(&self, config: &dyn RuleConfiguration) -> Option<&Arc<dyn Rule>> {
        self.rules.iter().find(|rule| rule.is_built_from(config))
    }

    /// First rule whose configuration has the given rule type.
    pub fn find_by_type(&self, rule_type: &str) -> Option<&Arc<dyn Rule>> {
        self.rules
            .iter()
            .find(|rule| rule.configuration().rule_type() == rule_type)
    }

    /// Copy of the configuration of type `T` currently in effect, if any.
    pub fn configuration<T: RuleConfiguration + Clone>(&self) -> Option<T> {
        self.rules
            .iter()
            .find_map(|rule| rule.configuration().downcast_ref::<T>().cloned())
    }

    /// One configuration per rule family, in rule order.
    pub fn configurations(&self) -> Vec<Arc<dyn RuleConfiguration>> {
        let mut configs: Vec<Arc<dyn RuleConfiguration>> = Vec::new();
        for rule in &self.rules {
            let config = rule.configuration();
            if !configs.iter().any(|c| c.is_same_type(config.as_ref())) {
                configs.push(config);
            }
        }
        configs
    }

    /// Swap every rule of `config`'s family for `built`.
    ///
    /// The new rules take the position of the first removed one, or go last
    /// when the family was not present. Returns the new set and the removed
    /// rules.
    pub fn replace_family(
        &self,
        config: &dyn RuleConfiguration,
        built: Vec<Arc<dyn Rule>>,
    ) -> (Self, Vec<Arc<dyn Rule>>) {
        let position = self.rules.iter().position(|rule| rule.is_built_from(config));
        let (removed, mut kept): (Vec<_>, Vec<_>) = self
            .rules
            .iter()
            .cloned()
            .partition(|rule| rule.is_built_from(config));
        let at = position.unwrap_or(kept.len());
        kept.splice(at..at, built);
        (Self::new(kept), removed)
    }

    /// Remove every rule whose configuration has `rule_type`.
    pub fn remove_type(&self, rule_type: &str) -> (Self, Vec<Arc<dyn Rule>>) {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .rules
            .iter()
            .cloned()
            .partition(|rule| rule.configuration().rule_type() == rule_type);
        (Self::new(kept), removed)
    }
}

/// A logical database: its storage units and the rules built over them.
#[derive(Debug, Clone)]
pub struct Database {
    pub name: String,
    pub storage_units: IndexMap<String, DataSourcePoolProperties>,
    pub rules: RuleMetaData,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            storage_units: IndexMap::new(),
            rules: RuleMetaData::default(),
        }
    }

    pub fn with_storage_units(mut self, storage_units: IndexMap<String, DataSourcePoolProperties>) -> Self {
        self.storage_units = storage_units;
        self
    }

    pub fn with_rules(mut self, rules: RuleMetaData) -> Self {
        self.rules = rules;
        self
    }

    /// Configuration of the rule with the given type.
    pub fn rule_configuration(&self, rule_type: &str) -> Option<Arc<dyn RuleConfiguration>> {
        self.rules.find_by_type(rule_type).map(|rule| rule.configuration())
    }
}

/// Immutable view of all metadata at one point in time.
#[derive(Debug, Clone)]
pub struct MetaDataSnapshot {
    /// Incremented on every publication.
    pub generation: u64,
    pub databases: BTreeMap<String, Arc<Database>>,
    pub global_rules: RuleMetaData,
    pub props: ConfigurationProperties,
    pub published_at: OffsetDateTime,
}

impl Default for MetaDataSnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

impl MetaDataSnapshot {
    pub fn empty() -> Self {
        Self {
            generation: 0,
            databases: BTreeMap::new(),
            global_rules: RuleMetaData::default(),
            props: ConfigurationProperties::default(),
            published_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn database(&self, name: &str) -> Option<&Arc<Database>> {
        self.databases.get(name)
    }

    pub fn database_names(&self) -> impl Iterator<Item = &str> {
        self.databases.keys().map(String::as_str)
    }

    fn next(&self) -> Self {
        Self {
            generation: self.generation + 1,
            published_at: OffsetDateTime::now_utc(),
            ..self.clone()
        }
    }

    /// Successor with `database` inserted or replaced.
    pub fn with_database(&self, database: Arc<Database>) -> Self {
        let mut next = self.next();
        next.databases.insert(database.name.clone(), database);
        next
    }

    pub fn without_database(&self, name: &str) -> Self {
        let mut next = self.next();
        next.databases.remove(name);
        next
    }

    pub fn with_global_rules(&self, global_rules: RuleMetaData) -> Self {
        Self {
            global_rules,
            ..self.next()
        }
    }

    pub fn with_props(&self, props: ConfigurationProperties) -> Self {
        Self { props, ..self.next() }
    }
}

/// Shared, atomically swappable pointer to the current snapshot.
#[derive(Clone)]
pub struct MetaDataHandle {
    inner: Arc<ArcSwap<MetaDataSnapshot>>,
}

impl Default for MetaDataHandle {
    fn default() -> Self {
        Self::new(MetaDataSnapshot::empty())
    }
}

impl MetaDataHandle {
    pub fn new(snapshot: MetaDataSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    /// Current snapshot. Lock-free.
    pub fn load(&self) -> Arc<MetaDataSnapshot> {
        self.inner.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.inner.load().generation
    }

    /// Publish a successor derived from the current snapshot.
    ///
    /// `derive` may run more than once if another writer publishes
    /// concurrently, so it must be free of side effects. Returns the snapshot
    /// that was published.
    pub fn update<F>(&self, derive: F) -> Arc<MetaDataSnapshot>
    where
        F: Fn(&MetaDataSnapshot) -> MetaDataSnapshot,
    {
        let mut published = None;
        self.inner.rcu(|current| {
            let next = Arc::new(derive(current));
            published = Some(next.clone());
            next
        });
        published.unwrap_or_else(|| self.inner.load_full())
    }

    /// Replace the current snapshot wholesale.
    pub fn store(&self, snapshot: MetaDataSnapshot) {
        self.inner.store(Arc::new(snapshot));
    }
}

impl std::fmt::Debug for MetaDataHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetaDataHandle")
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct NamedConfig(&'static str);

    impl RuleConfiguration for NamedConfig {
        fn rule_type(&self) -> &str {
            self.0
        }
        fn is_empty(&self) -> bool {
            false
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

    #[derive(Debug, Clone, PartialEq)]
    struct OtherConfig;

    impl RuleConfiguration for OtherConfig {
        fn rule_type(&self) -> &str {
            "other"
        }
        fn is_empty(&self) -> bool {
            false
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

    #[derive(Debug)]
    struct FixedRule(Arc<dyn RuleConfiguration>);

    impl Rule for FixedRule {
        fn configuration(&self) -> Arc<dyn RuleConfiguration> {
            self.0.clone()
        }
    }

    fn rule(config: impl RuleConfiguration) -> Arc<dyn Rule> {
        Arc::new(FixedRule(Arc::new(config)))
    }

    #[test]
    fn test_replace_family_keeps_position() {
        let rules = RuleMetaData::new(vec![
            rule(OtherConfig),
            rule(NamedConfig("a")),
            rule(NamedConfig("b")),
        ]);
        let (next, removed) = rules.replace_family(&NamedConfig("a"), vec![rule(NamedConfig("c"))]);

        assert_eq!(removed.len(), 2);
        let types: Vec<_> = next.rules().iter().map(|r| r.rule_type()).collect();
        assert_eq!(types, ["other", "c"]);
    }

    #[test]
    fn test_replace_family_appends_new_family() {
        let rules = RuleMetaData::new(vec![rule(NamedConfig("a"))]);
        let (next, removed) = rules.replace_family(&OtherConfig, vec![rule(OtherConfig)]);
        assert!(removed.is_empty());
        assert_eq!(next.len(), 2);
        assert_eq!(next.rules()[1].rule_type(), "other");
    }

    #[test]
    fn test_configurations_dedups_families() {
        let rules = RuleMetaData::new(vec![rule(NamedConfig("a")), rule(NamedConfig("a")), rule(OtherConfig)]);
        assert_eq!(rules.configurations().len(), 2);
        assert_eq!(rules.configuration::<OtherConfig>(), Some(OtherConfig));
    }

    #[test]
    fn test_with_database_shares_untouched_databases() {
        let base = MetaDataSnapshot::empty()
            .with_database(Arc::new(Database::new("a")))
            .with_database(Arc::new(Database::new("b")));
        let next = base.with_database(Arc::new(Database::new("b").with_rules(RuleMetaData::new(vec![rule(OtherConfig)]))));

        assert_eq!(next.generation, base.generation + 1);
        assert!(Arc::ptr_eq(&base.databases["a"], &next.databases["a"]));
        assert!(base.databases["b"].rules.is_empty());
        assert_eq!(next.databases["b"].rules.len(), 1);
    }

    #[test]
    fn test_handle_update_returns_published() {
        let handle = MetaDataHandle::default();
        let before = handle.load();
        let published = handle.update(|current| current.with_database(Arc::new(Database::new("db"))));

        assert_eq!(published.generation, 1);
        assert!(Arc::ptr_eq(&published, &handle.load()));
        assert!(before.database("db").is_none());
    }
}
