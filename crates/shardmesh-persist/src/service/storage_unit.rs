use std::sync::Arc;

use indexmap::IndexMap;
use shardmesh_core::DataSourcePoolProperties;

use crate::error::PersistError;
use crate::node_path;
use crate::store::VersionedConfigStore;
use crate::version::MetaDataVersion;
use crate::Result;

/// Persists storage unit definitions of each database.
#[derive(Debug, Clone)]
pub struct StorageUnitPersistService {
    store: Arc<VersionedConfigStore>,
}

impl StorageUnitPersistService {
    pub fn new(store: Arc<VersionedConfigStore>) -> Self {
        Self { store }
    }

    pub async fn persist(
        &self,
        database: &str,
        name: &str,
        props: &DataSourcePoolProperties,
    ) -> Result<MetaDataVersion> {
        let key = node_path::storage_unit(database, name);
        let content = serde_json::to_string(props).map_err(|e| PersistError::serialization(&key, e))?;
        self.store.persist(&key, &content).await
    }

    pub async fn load(&self, database: &str, name: &str) -> Result<Option<DataSourcePoolProperties>> {
        let key = node_path::storage_unit(database, name);
        self.store
            .load(&key)
            .await?
            .map(|content| serde_json::from_str(&content).map_err(|e| PersistError::serialization(&key, e)))
            .transpose()
    }

    /// Every storage unit of `database`, in repository order.
    pub async fn load_all(&self, database: &str) -> Result<IndexMap<String, DataSourcePoolProperties>> {
        let names = self
            .store
            .repository()
            .get_children(&node_path::storage_units(database))
            .await?;
        let mut units = IndexMap::with_capacity(names.len());
        for name in names {
            if let Some(props) = self.load(database, &name).await? {
                units.insert(name, props);
            }
        }
        Ok(units)
    }

    pub async fn delete(&self, database: &str, name: &str) -> Result<MetaDataVersion> {
        self.store
            .delete(&node_path::storage_unit(database, name))
            .await
    }
}
