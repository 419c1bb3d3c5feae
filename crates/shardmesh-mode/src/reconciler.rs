//! Rule reconciliation.
//!
//! A configuration change is absorbed either in place (partial update) or by
//! rebuilding the whole rule family and publishing a new snapshot. Rules
//! replaced by a rebuild are disposed only after the successor snapshot is
//! published, so no reader can observe a disposed rule.

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use shardmesh_core::{DataSourcePoolProperties, Rule, RuleConfiguration};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::factory::{RuleBuildContext, RuleFactoryRegistry, build_database_rules};
use crate::instance::InstanceContext;
use crate::snapshot::{Database, MetaDataHandle, MetaDataSnapshot, RuleMetaData};
use crate::{ModeError, Result};

/// Per-database mutual exclusion for reconciliation.
#[derive(Debug, Clone, Default)]
pub struct DatabaseLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl DatabaseLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `database`.
    pub async fn lock(&self, database: &str) -> DatabaseGuard {
        let mutex = self
            .locks
            .entry(database.to_string())
            .or_default()
            .value()
            .clone();
        DatabaseGuard {
            database: database.to_string(),
            _guard: mutex.lock_owned().await,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Proof of exclusive access to one database.
#[derive(Debug)]
pub struct DatabaseGuard {
    database: String,
    _guard: OwnedMutexGuard<()>,
}

impl DatabaseGuard {
    pub fn database(&self) -> &str {
        &self.database
    }
}

/// How a change was absorbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Applied in place; the published snapshot did not change.
    PartiallyUpdated,
    /// A new snapshot was published.
    Rebuilt {
        generation: u64,
        removed: usize,
        added: usize,
    },
    /// Nothing to do.
    Unchanged,
}

/// Applies rule configuration changes to the published snapshot.
#[derive(Debug, Clone)]
pub struct RuleReconciler {
    handle: MetaDataHandle,
    factories: Arc<RuleFactoryRegistry>,
    instance: Arc<InstanceContext>,
    locks: DatabaseLocks,
}

impl RuleReconciler {
    pub fn new(
        handle: MetaDataHandle,
        factories: Arc<RuleFactoryRegistry>,
        instance: Arc<InstanceContext>,
        locks: DatabaseLocks,
    ) -> Self {
        Self {
            handle,
            factories,
            instance,
            locks,
        }
    }

    pub fn handle(&self) -> &MetaDataHandle {
        &self.handle
    }

    pub fn factories(&self) -> &Arc<RuleFactoryRegistry> {
        &self.factories
    }

    pub fn locks(&self) -> &DatabaseLocks {
        &self.locks
    }

    /// Apply `config` to `database`.
    ///
    /// When the current rule of the same family accepts a partial update it
    /// is updated in place, and with `rebuild == false` nothing else happens.
    /// Otherwise the family is rebuilt and a new snapshot is published.
    pub async fn reconcile(
        &self,
        database: &str,
        config: Arc<dyn RuleConfiguration>,
        rebuild: bool,
    ) -> Result<ReconcileOutcome> {
        let guard = self.locks.lock(database).await;
        self.reconcile_locked(&guard, config, rebuild)
    }

    /// [`reconcile`](Self::reconcile) for a caller already holding the lock.
    pub fn reconcile_locked(
        &self,
        guard: &DatabaseGuard,
        config: Arc<dyn RuleConfiguration>,
        rebuild: bool,
    ) -> Result<ReconcileOutcome> {
        let database = guard.database();
        let snapshot = self.handle.load();
        let current = require_database(&snapshot, database)?;

        if let Some(rule) = current.rules.find_built_from(config.as_ref())
            && let Some(partial) = rule.as_partial_update()
            && partial.partial_update(config.as_ref())
        {
            partial.update_configuration(config.clone());
            debug!(database = %database, rule_type = %config.rule_type(), "Partially updated rule");
            if !rebuild {
                return Ok(ReconcileOutcome::PartiallyUpdated);
            }
        }

        self.replace_family(&snapshot, current, config, true)
    }

    /// Remove `config`'s family and rebuild it from `config` unless it is empty.
    pub async fn drop_rule_configuration(
        &self,
        database: &str,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<ReconcileOutcome> {
        let guard = self.locks.lock(database).await;
        self.drop_rule_configuration_locked(&guard, config)
    }

    pub fn drop_rule_configuration_locked(
        &self,
        guard: &DatabaseGuard,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<ReconcileOutcome> {
        let snapshot = self.handle.load();
        let current = require_database(&snapshot, guard.database())?;
        if config.is_empty() && current.rules.find_built_from(config.as_ref()).is_none() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let build = !config.is_empty();
        self.replace_family(&snapshot, current, config, build)
    }

    /// Remove every rule with `rule_type` from `database`.
    pub async fn remove_rules(&self, database: &str, rule_type: &str) -> Result<ReconcileOutcome> {
        let guard = self.locks.lock(database).await;
        let snapshot = self.handle.load();
        let current = require_database(&snapshot, guard.database())?;

        let (rules, removed) = current.rules.remove_type(rule_type);
        if removed.is_empty() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let next = Arc::new(Database::clone(current).with_rules(rules));
        let published = self.handle.update(|s| s.with_database(next.clone()));
        info!(database = %database, rule_type = %rule_type, generation = published.generation, "Removed rules");

        dispose_all(&format!("database {database}"), &removed)?;
        Ok(ReconcileOutcome::Rebuilt {
            generation: published.generation,
            removed: removed.len(),
            added: 0,
        })
    }

    /// Publish `database` with its storage units and no rules. Returns false
    /// if it already exists.
    pub async fn add_database(
        &self,
        database: &str,
        storage_units: IndexMap<String, DataSourcePoolProperties>,
    ) -> Result<bool> {
        let _guard = self.locks.lock(database).await;
        if self.handle.load().database(database).is_some() {
            return Ok(false);
        }
        let next = Arc::new(Database::new(database).with_storage_units(storage_units));
        let published = self.handle.update(|s| s.with_database(next.clone()));
        info!(database = %database, generation = published.generation, "Added database");
        Ok(true)
    }

    /// Unpublish `database` and dispose all of its rules. Returns false if it
    /// did not exist.
    pub async fn drop_database(&self, database: &str) -> Result<bool> {
        let _guard = self.locks.lock(database).await;
        let Some(current) = self.handle.load().database(database).cloned() else {
            return Ok(false);
        };
        let published = self.handle.update(|s| s.without_database(database));
        info!(database = %database, generation = published.generation, "Dropped database");

        dispose_all(&format!("database {database}"), current.rules.rules())?;
        Ok(true)
    }

    /// Edit the storage units of `database` and rebuild all of its rules.
    ///
    /// `edit` returns false when it changed nothing, in which case the
    /// snapshot is left alone.
    pub async fn alter_storage_units<F>(&self, database: &str, edit: F) -> Result<ReconcileOutcome>
    where
        F: FnOnce(&mut IndexMap<String, DataSourcePoolProperties>) -> bool,
    {
        let guard = self.locks.lock(database).await;
        let snapshot = self.handle.load();
        let current = require_database(&snapshot, guard.database())?;

        let mut storage_units = current.storage_units.clone();
        if !edit(&mut storage_units) {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let rules = build_database_rules(
            &self.factories,
            &self.instance,
            database,
            &storage_units,
            &current.rules.configurations(),
            &snapshot.props,
        )?;
        let added = rules.len();
        let next = Arc::new(
            Database::new(database)
                .with_storage_units(storage_units)
                .with_rules(RuleMetaData::new(rules)),
        );
        let published = self.handle.update(|s| s.with_database(next.clone()));
        info!(
            database = %database,
            storage_units = next.storage_units.len(),
            generation = published.generation,
            "Rebuilt database after storage unit change"
        );

        dispose_all(&format!("database {database}"), current.rules.rules())?;
        Ok(ReconcileOutcome::Rebuilt {
            generation: published.generation,
            removed: current.rules.len(),
            added,
        })
    }

    fn replace_family(
        &self,
        snapshot: &MetaDataSnapshot,
        current: &Arc<Database>,
        config: Arc<dyn RuleConfiguration>,
        build: bool,
    ) -> Result<ReconcileOutcome> {
        let database = current.name.as_str();
        let built = if build {
            let factory = self.factories.require(config.rule_type())?;
            let (kept, _) = current.rules.replace_family(config.as_ref(), Vec::new());
            let context = RuleBuildContext {
                database,
                storage_units: &current.storage_units,
                existing_rules: kept.rules(),
                props: &snapshot.props,
                instance: &self.instance,
            };
            factory.build(&context, config.clone())?
        } else {
            Vec::new()
        };

        let added = built.len();
        let (rules, removed) = current.rules.replace_family(config.as_ref(), built);
        let next = Arc::new(Database::clone(current).with_rules(rules));
        let published = self.handle.update(|s| s.with_database(next.clone()));
        info!(
            database = %database,
            rule_type = %config.rule_type(),
            removed = removed.len(),
            added,
            generation = published.generation,
            "Published rebuilt rules"
        );

        dispose_all(&format!("database {database}"), &removed)?;
        Ok(ReconcileOutcome::Rebuilt {
            generation: published.generation,
            removed: removed.len(),
            added,
        })
    }
}

fn require_database<'a>(snapshot: &'a MetaDataSnapshot, database: &str) -> Result<&'a Arc<Database>> {
    snapshot
        .database(database)
        .ok_or_else(|| ModeError::DatabaseNotFound(database.to_string()))
}

/// Dispose every disposable rule in `removed`.
///
/// All disposals are attempted; failures are collected into one error.
pub(crate) fn dispose_all(scope: &str, removed: &[Arc<dyn Rule>]) -> Result<()> {
    let mut failures = Vec::new();
    for rule in removed {
        let Some(disposable) = rule.as_disposable() else {
            continue;
        };
        if let Err(err) = disposable.dispose() {
            warn!(scope = %scope, rule_type = %rule.rule_type(), error = %err, "Failed to dispose rule");
            failures.push(format!("{}: {err}", rule.rule_type()));
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ModeError::Dispose {
            scope: scope.to_string(),
            failures,
        })
    }
}
