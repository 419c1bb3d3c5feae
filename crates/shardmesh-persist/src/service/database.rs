use std::sync::Arc;

use shardmesh_repository::RepositoryClient;
use tracing::info;

use crate::node_path::{self, METADATA_ROOT};
use crate::Result;

/// Tracks which logical databases exist.
#[derive(Clone)]
pub struct DatabasePersistService {
    repository: Arc<dyn RepositoryClient>,
}

impl DatabasePersistService {
    pub fn new(repository: Arc<dyn RepositoryClient>) -> Self {
        Self { repository }
    }

    pub async fn add(&self, database: &str) -> Result<()> {
        let path = node_path::database(database);
        if !self.repository.exists(&path).await? {
            self.repository.persist(&path, "").await?;
            info!(database = %database, "Database registered");
        }
        Ok(())
    }

    /// Remove the database together with everything stored under it.
    pub async fn drop(&self, database: &str) -> Result<()> {
        self.repository.delete(&node_path::database(database)).await?;
        info!(database = %database, "Database removed");
        Ok(())
    }

    pub async fn exists(&self, database: &str) -> Result<bool> {
        Ok(self.repository.exists(&node_path::database(database)).await?)
    }

    pub async fn load_all_names(&self) -> Result<Vec<String>> {
        Ok(self.repository.get_children(METADATA_ROOT).await?)
    }
}

impl std::fmt::Debug for DatabasePersistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabasePersistService")
            .field("repository", &self.repository.name())
            .finish()
    }
}
