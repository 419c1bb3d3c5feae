//! Persist services, one per concern, all sharing one versioned store.

mod compute_node;
mod database;
mod database_rule;
mod global_rule;
mod properties;
mod storage_unit;

use std::sync::Arc;

use shardmesh_repository::RepositoryClient;

pub use compute_node::{ComputeNodePersistService, MAX_WORKER_ID};
pub use database::DatabasePersistService;
pub use database_rule::DatabaseRulePersistService;
pub use global_rule::GlobalRulePersistService;
pub use properties::PropertiesPersistService;
pub use storage_unit::StorageUnitPersistService;

use crate::store::VersionedConfigStore;
use crate::swapper::SwapperRegistry;

/// Aggregate of every persist service over one repository.
#[derive(Debug, Clone)]
pub struct MetaDataPersistService {
    store: Arc<VersionedConfigStore>,
    database_rules: DatabaseRulePersistService,
    global_rules: GlobalRulePersistService,
    props: PropertiesPersistService,
    storage_units: StorageUnitPersistService,
    databases: DatabasePersistService,
    compute_nodes: ComputeNodePersistService,
}

impl MetaDataPersistService {
    pub fn new(repository: Arc<dyn RepositoryClient>, swappers: Arc<SwapperRegistry>) -> Self {
        let store = Arc::new(VersionedConfigStore::new(repository.clone()));
        Self {
            database_rules: DatabaseRulePersistService::new(store.clone(), swappers.clone()),
            global_rules: GlobalRulePersistService::new(store.clone(), swappers),
            props: PropertiesPersistService::new(store.clone()),
            storage_units: StorageUnitPersistService::new(store.clone()),
            databases: DatabasePersistService::new(repository.clone()),
            compute_nodes: ComputeNodePersistService::new(repository),
            store,
        }
    }

    pub fn store(&self) -> &Arc<VersionedConfigStore> {
        &self.store
    }

    pub fn database_rules(&self) -> &DatabaseRulePersistService {
        &self.database_rules
    }

    pub fn global_rules(&self) -> &GlobalRulePersistService {
        &self.global_rules
    }

    pub fn props(&self) -> &PropertiesPersistService {
        &self.props
    }

    pub fn storage_units(&self) -> &StorageUnitPersistService {
        &self.storage_units
    }

    pub fn databases(&self) -> &DatabasePersistService {
        &self.databases
    }

    pub fn compute_nodes(&self) -> &ComputeNodePersistService {
        &self.compute_nodes
    }
}
