//! Rule item coordination.
//!
//! Translates a single changed rule item (one algorithm, one table, one
//! default strategy) into a whole-configuration change and hands it to the
//! reconciler.

use std::sync::Arc;

use indexmap::IndexMap;
use shardmesh_core::{RuleChangedItemType, RuleConfiguration};
use shardmesh_dispatch::{AlterRuleItemEvent, DropRuleItemEvent};
use shardmesh_persist::{MetaDataPersistService, RuleItemPath};
use tracing::{debug, info};

use crate::reconciler::{ReconcileOutcome, RuleReconciler};
use crate::snapshot::Database;
use crate::{ModeError, Result};

/// Applies one kind of rule item to its rule configuration.
pub trait RuleItemConfigurationChangedProcessor: Send + Sync {
    /// The `(rule type, item type)` this processor handles.
    fn changed_item_type(&self) -> RuleChangedItemType;

    /// Copy of the database's current configuration, or an empty one when
    /// the database has none.
    fn find_rule_configuration(&self, database: &Database) -> Box<dyn RuleConfiguration>;

    /// Deserialize `content` and apply it to `current`.
    fn change_rule_item_configuration(
        &self,
        item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
        content: &str,
    ) -> Result<()>;

    /// Remove the item from `current`.
    fn drop_rule_item_configuration(
        &self,
        item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
    ) -> Result<()>;
}

/// Explicit registry of rule item processors.
#[derive(Default, Clone)]
pub struct RuleItemProcessorRegistry {
    processors: IndexMap<RuleChangedItemType, Arc<dyn RuleItemConfigurationChangedProcessor>>,
}

impl RuleItemProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, processor: Arc<dyn RuleItemConfigurationChangedProcessor>) {
        self.processors.insert(processor.changed_item_type(), processor);
    }

    pub fn with(mut self, processor: Arc<dyn RuleItemConfigurationChangedProcessor>) -> Self {
        self.register(processor);
        self
    }

    pub fn get(
        &self,
        item_type: &RuleChangedItemType,
    ) -> Option<&Arc<dyn RuleItemConfigurationChangedProcessor>> {
        self.processors.get(item_type)
    }

    pub fn require(
        &self,
        item_type: &RuleChangedItemType,
    ) -> Result<&Arc<dyn RuleItemConfigurationChangedProcessor>> {
        self.get(item_type)
            .ok_or_else(|| ModeError::ProcessorNotFound(item_type.to_string()))
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl std::fmt::Debug for RuleItemProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self.processors.keys().map(ToString::to_string).collect();
        f.debug_struct("RuleItemProcessorRegistry")
            .field("item_types", &keys)
            .finish()
    }
}

/// Routes rule item changes through processors into the reconciler.
#[derive(Debug, Clone)]
pub struct RuleItemCoordinator {
    persist: Arc<MetaDataPersistService>,
    reconciler: Arc<RuleReconciler>,
    processors: Arc<RuleItemProcessorRegistry>,
}

impl RuleItemCoordinator {
    pub fn new(
        persist: Arc<MetaDataPersistService>,
        reconciler: Arc<RuleReconciler>,
        processors: Arc<RuleItemProcessorRegistry>,
    ) -> Self {
        Self {
            persist,
            reconciler,
            processors,
        }
    }

    /// Apply an activated item version.
    ///
    /// Returns `None` when the event is stale (the item's active version has
    /// moved on) or its content is gone.
    pub async fn alter_rule_item(&self, event: &AlterRuleItemEvent) -> Result<Option<ReconcileOutcome>> {
        self.try_alter_rule_item(event)
            .await
            .map_err(|err| ModeError::operation_failed("alter rule item", &event.active_version_key, err))
    }

    async fn try_alter_rule_item(&self, event: &AlterRuleItemEvent) -> Result<Option<ReconcileOutcome>> {
        let processor = self.processors.require(&event.changed_item_type())?;
        let store = self.persist.store();
        let key = &event.active_version_key;

        let active = store.active_version(key).await?;
        if active != Some(event.active_version) {
            debug!(key = %key, event_version = event.active_version, active = ?active, "Skipping stale rule item event");
            return Ok(None);
        }
        let Some(content) = store.load_version(key, event.active_version).await? else {
            debug!(key = %key, version = event.active_version, "Rule item content is gone");
            return Ok(None);
        };

        let guard = self.reconciler.locks().lock(&event.database).await;
        let snapshot = self.reconciler.handle().load();
        let database = snapshot
            .database(&event.database)
            .ok_or_else(|| ModeError::DatabaseNotFound(event.database.clone()))?;

        let mut config = processor.find_rule_configuration(database);
        processor.change_rule_item_configuration(event.item_name.as_deref(), &mut *config, &content)?;
        let outcome = self.reconciler.reconcile_locked(&guard, Arc::from(config), true)?;
        info!(
            database = %event.database,
            item = %event.changed_item_type(),
            name = ?event.item_name,
            version = event.active_version,
            "Applied rule item"
        );
        Ok(Some(outcome))
    }

    /// Remove an item from its configuration.
    ///
    /// Returns `None` when the database is unknown. When nothing remains of
    /// the configuration its rules are dropped entirely.
    pub async fn drop_rule_item(&self, event: &DropRuleItemEvent) -> Result<Option<ReconcileOutcome>> {
        let target = RuleItemPath::new(
            &event.database,
            &event.rule_type,
            event.item_type.as_deref(),
            event.item_name.as_deref(),
        )
        .key();
        self.try_drop_rule_item(event)
            .await
            .map_err(|err| ModeError::operation_failed("drop rule item", target, err))
    }

    async fn try_drop_rule_item(&self, event: &DropRuleItemEvent) -> Result<Option<ReconcileOutcome>> {
        let guard = self.reconciler.locks().lock(&event.database).await;
        let snapshot = self.reconciler.handle().load();
        let Some(database) = snapshot.database(&event.database) else {
            debug!(database = %event.database, "Skipping rule item drop for unknown database");
            return Ok(None);
        };
        let processor = self.processors.require(&event.changed_item_type())?;

        let mut config = processor.find_rule_configuration(database);
        processor.drop_rule_item_configuration(event.item_name.as_deref(), &mut *config)?;
        let config: Arc<dyn RuleConfiguration> = Arc::from(config);
        let outcome = if config.is_empty() {
            self.reconciler.drop_rule_configuration_locked(&guard, config)?
        } else {
            self.reconciler.reconcile_locked(&guard, config, true)?
        };
        info!(
            database = %event.database,
            item = %event.changed_item_type(),
            name = ?event.item_name,
            "Dropped rule item"
        );
        Ok(Some(outcome))
    }

    /// Apply whatever version is active at `path`.
    pub async fn apply_rule_item(&self, path: &str) -> Result<Option<ReconcileOutcome>> {
        let item = RuleItemPath::parse(path)
            .ok_or_else(|| ModeError::operation_failed("apply rule item", path, ModeError::InvalidPath(path.to_string())))?;
        let key = item.key();
        let active = self
            .persist
            .store()
            .active_version(&key)
            .await
            .map_err(|err| ModeError::operation_failed("apply rule item", &key, err.into()))?;
        let Some(active_version) = active else {
            debug!(key = %key, "Rule item has no active version");
            return Ok(None);
        };
        self.alter_rule_item(&AlterRuleItemEvent {
            database: item.database,
            rule_type: item.rule_type,
            item_type: item.item_type,
            item_name: item.item_name,
            active_version_key: key,
            active_version,
        })
        .await
    }

    /// Drop the item at `path`.
    pub async fn drop_rule_item_at(&self, path: &str) -> Result<Option<ReconcileOutcome>> {
        let item = RuleItemPath::parse(path)
            .ok_or_else(|| ModeError::operation_failed("drop rule item", path, ModeError::InvalidPath(path.to_string())))?;
        self.drop_rule_item(&DropRuleItemEvent {
            database: item.database,
            rule_type: item.rule_type,
            item_type: item.item_type,
            item_name: item.item_name,
        })
        .await
    }
}
