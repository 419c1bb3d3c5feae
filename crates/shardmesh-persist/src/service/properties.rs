use std::sync::Arc;

use shardmesh_core::ConfigurationProperties;

use crate::error::PersistError;
use crate::node_path::PROPS;
use crate::store::VersionedConfigStore;
use crate::version::MetaDataVersion;
use crate::Result;

/// Persists the cluster properties under `/props`.
#[derive(Debug, Clone)]
pub struct PropertiesPersistService {
    store: Arc<VersionedConfigStore>,
}

impl PropertiesPersistService {
    pub fn new(store: Arc<VersionedConfigStore>) -> Self {
        Self { store }
    }

    pub async fn persist(&self, props: &ConfigurationProperties) -> Result<MetaDataVersion> {
        let content =
            serde_json::to_string(props).map_err(|e| PersistError::serialization(PROPS, e))?;
        self.store.persist(PROPS, &content).await
    }

    /// Active properties; empty when none were ever persisted.
    pub async fn load(&self) -> Result<ConfigurationProperties> {
        match self.store.load(PROPS).await? {
            Some(content) => {
                serde_json::from_str(&content).map_err(|e| PersistError::serialization(PROPS, e))
            }
            None => Ok(ConfigurationProperties::default()),
        }
    }

    /// Properties stored in an explicit version.
    pub async fn load_version(&self, version: u64) -> Result<Option<ConfigurationProperties>> {
        self.store
            .load_version(PROPS, version)
            .await?
            .map(|content| {
                serde_json::from_str(&content).map_err(|e| PersistError::serialization(PROPS, e))
            })
            .transpose()
    }
}
