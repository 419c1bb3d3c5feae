//! Storage unit lifecycle.
//!
//! Every storage unit change rebuilds all rules of its database, since rules
//! may resolve data nodes against any unit.

use std::sync::Arc;

use shardmesh_core::DataSourcePoolProperties;
use shardmesh_persist::MetaDataPersistService;
use tracing::debug;

use crate::reconciler::{ReconcileOutcome, RuleReconciler};
use crate::{ModeError, Result};

#[derive(Debug, Clone)]
pub struct StorageUnitManager {
    persist: Arc<MetaDataPersistService>,
    reconciler: Arc<RuleReconciler>,
}

impl StorageUnitManager {
    pub fn new(persist: Arc<MetaDataPersistService>, reconciler: Arc<RuleReconciler>) -> Self {
        Self { persist, reconciler }
    }

    /// Persist and activate `props` as storage unit `name`, then apply it.
    pub async fn register(
        &self,
        database: &str,
        name: &str,
        props: DataSourcePoolProperties,
    ) -> Result<ReconcileOutcome> {
        let target = format!("{database}.{name}");
        let persisted = async {
            let receipt = self.persist.storage_units().persist(database, name, &props).await?;
            self.persist
                .store()
                .switch_active_versions(std::slice::from_ref(&receipt))
                .await
        };
        persisted
            .await
            .map_err(|err| ModeError::operation_failed("register storage unit", &target, err.into()))?;
        self.apply(database, name, props)
            .await
            .map_err(|err| ModeError::operation_failed("register storage unit", target, err))
    }

    /// Load the active definition of `name` and apply it.
    pub async fn reload(&self, database: &str, name: &str) -> Result<ReconcileOutcome> {
        let target = format!("{database}.{name}");
        let loaded = self
            .persist
            .storage_units()
            .load(database, name)
            .await
            .map_err(|err| ModeError::operation_failed("reload storage unit", &target, err.into()))?;
        let Some(props) = loaded else {
            debug!(database = %database, name = %name, "Storage unit has no active definition");
            return Ok(ReconcileOutcome::Unchanged);
        };
        self.apply(database, name, props)
            .await
            .map_err(|err| ModeError::operation_failed("reload storage unit", target, err))
    }

    /// Remove `name` from the published database.
    pub async fn unregister(&self, database: &str, name: &str) -> Result<ReconcileOutcome> {
        self.reconciler
            .alter_storage_units(database, |units| units.shift_remove(name).is_some())
            .await
            .map_err(|err| ModeError::operation_failed("unregister storage unit", format!("{database}.{name}"), err))
    }

    async fn apply(&self, database: &str, name: &str, props: DataSourcePoolProperties) -> Result<ReconcileOutcome> {
        self.reconciler
            .alter_storage_units(database, |units| {
                if units.get(name) == Some(&props) {
                    return false;
                }
                units.insert(name.to_string(), props);
                true
            })
            .await
    }
}
