//! Compute node registration and node-scoped state.

use std::collections::BTreeSet;
use std::sync::Arc;

use shardmesh_core::{
    ClusterState, ComputeNodeInstance, InstanceAttributes, InstanceState, InstanceType,
    ListenerAssistedType,
};
use shardmesh_repository::RepositoryClient;
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::node_path;
use crate::Result;

/// Worker ids are allocated from `0..MAX_WORKER_ID`.
pub const MAX_WORKER_ID: u32 = 1024;

/// Reads and writes the `/nodes/compute_nodes` and `/states` subtrees.
#[derive(Clone)]
pub struct ComputeNodePersistService {
    repository: Arc<dyn RepositoryClient>,
}

impl ComputeNodePersistService {
    pub fn new(repository: Arc<dyn RepositoryClient>) -> Self {
        Self { repository }
    }

    /// Publish `instance` as online together with its labels and state.
    pub async fn register_online(&self, instance: &ComputeNodeInstance) -> Result<()> {
        self.repository
            .persist(
                &node_path::compute_node_online(&instance.instance_type, &instance.id),
                &instance.attributes.encode(),
            )
            .await?;
        self.persist_labels(&instance.id, &instance.labels).await?;
        self.update_state(&instance.id, instance.state).await?;
        info!(instance_id = %instance.id, instance_type = %instance.instance_type, "Compute node online");
        Ok(())
    }

    /// Take `instance` offline and release its worker id.
    pub async fn offline(&self, instance: &ComputeNodeInstance) -> Result<()> {
        self.repository
            .delete(&node_path::compute_node_online(&instance.instance_type, &instance.id))
            .await?;
        self.repository.delete(&node_path::worker_id(&instance.id)).await?;
        info!(instance_id = %instance.id, "Compute node offline");
        Ok(())
    }

    /// Every online instance with its node-scoped state.
    pub async fn load_online_instances(&self) -> Result<Vec<ComputeNodeInstance>> {
        let mut instances = Vec::new();
        let types = self.repository.get_children(&node_path::compute_node_types()).await?;
        for instance_type in types.iter().map(|t| InstanceType::parse(t)) {
            let ids = self
                .repository
                .get_children(&node_path::compute_nodes_online(&instance_type))
                .await?;
            for id in ids {
                let attributes = self
                    .repository
                    .get(&node_path::compute_node_online(&instance_type, &id))
                    .await?
                    .map(|raw| InstanceAttributes::decode_or_default(&raw))
                    .unwrap_or_default();
                let mut instance = ComputeNodeInstance::new(id, instance_type.clone())
                    .with_attributes(attributes);
                instance.labels = self.load_labels(&instance.id).await?;
                instance.worker_id = self.load_worker_id(&instance.id).await?;
                instance.state = self.load_state(&instance.id).await?;
                instances.push(instance);
            }
        }
        Ok(instances)
    }

    pub async fn persist_worker_id(&self, instance_id: &str, worker_id: u32) -> Result<()> {
        self.repository
            .persist(&node_path::worker_id(instance_id), &worker_id.to_string())
            .await?;
        Ok(())
    }

    /// Worker id of an instance; malformed values read as unassigned.
    pub async fn load_worker_id(&self, instance_id: &str) -> Result<Option<u32>> {
        let raw = self.repository.get(&node_path::worker_id(instance_id)).await?;
        Ok(raw.and_then(|v| v.trim().parse().ok()))
    }

    pub async fn assigned_worker_ids(&self) -> Result<BTreeSet<u32>> {
        let mut assigned = BTreeSet::new();
        for instance_id in self.repository.get_children(&node_path::worker_ids()).await? {
            if let Some(worker_id) = self.load_worker_id(&instance_id).await? {
                assigned.insert(worker_id);
            }
        }
        Ok(assigned)
    }

    /// Keep the instance's existing worker id, or claim the lowest free one.
    pub async fn assign_worker_id(&self, instance_id: &str) -> Result<u32> {
        if let Some(existing) = self.load_worker_id(instance_id).await? {
            return Ok(existing);
        }
        let assigned = self.assigned_worker_ids().await?;
        let worker_id = (0..MAX_WORKER_ID)
            .find(|candidate| !assigned.contains(candidate))
            .ok_or_else(|| PersistError::WorkerIdExhausted(instance_id.to_string()))?;
        self.persist_worker_id(instance_id, worker_id).await?;
        debug!(instance_id = %instance_id, worker_id, "Assigned worker id");
        Ok(worker_id)
    }

    pub async fn persist_labels(&self, instance_id: &str, labels: &[String]) -> Result<()> {
        let path = node_path::labels(instance_id);
        let content =
            serde_json::to_string(labels).map_err(|e| PersistError::serialization(&path, e))?;
        self.repository.persist(&path, &content).await?;
        Ok(())
    }

    /// Labels of an instance; malformed content reads as no labels.
    pub async fn load_labels(&self, instance_id: &str) -> Result<Vec<String>> {
        let path = node_path::labels(instance_id);
        let Some(raw) = self.repository.get(&path).await? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path, error = %e, "Ignoring malformed labels");
            Vec::new()
        }))
    }

    pub async fn update_state(&self, instance_id: &str, state: InstanceState) -> Result<()> {
        self.repository
            .persist(&node_path::status(instance_id), &state.to_string())
            .await?;
        Ok(())
    }

    pub async fn load_state(&self, instance_id: &str) -> Result<InstanceState> {
        let raw = self.repository.get(&node_path::status(instance_id)).await?;
        Ok(raw
            .map(|v| InstanceState::parse_or_default(&v))
            .unwrap_or_default())
    }

    pub async fn persist_cluster_state(&self, state: ClusterState) -> Result<()> {
        self.repository
            .persist(&node_path::cluster_state(), &state.to_string())
            .await?;
        info!(state = %state, "Cluster state persisted");
        Ok(())
    }

    pub async fn load_cluster_state(&self) -> Result<ClusterState> {
        let raw = self.repository.get(&node_path::cluster_state()).await?;
        Ok(raw
            .map(|v| ClusterState::parse_or_default(&v))
            .unwrap_or_default())
    }

    pub async fn trigger_show_process_list(&self, instance_id: &str, task_id: &str) -> Result<()> {
        self.repository
            .persist(&node_path::show_process_list_trigger(instance_id, task_id), "")
            .await?;
        Ok(())
    }

    pub async fn complete_show_process_list(&self, instance_id: &str, task_id: &str) -> Result<()> {
        self.repository
            .delete(&node_path::show_process_list_trigger(instance_id, task_id))
            .await?;
        Ok(())
    }

    pub async fn trigger_kill_process(&self, instance_id: &str, process_id: &str) -> Result<()> {
        self.repository
            .persist(&node_path::kill_process_trigger(instance_id, process_id), "")
            .await?;
        Ok(())
    }

    pub async fn complete_kill_process(&self, instance_id: &str, process_id: &str) -> Result<()> {
        self.repository
            .delete(&node_path::kill_process_trigger(instance_id, process_id))
            .await?;
        Ok(())
    }

    /// Ask every node to run a database lifecycle step.
    pub async fn mark_listener_assisted(
        &self,
        database: &str,
        assisted: ListenerAssistedType,
    ) -> Result<()> {
        self.repository
            .persist(&node_path::listener_assisted(database), &assisted.to_string())
            .await?;
        Ok(())
    }

    pub async fn clear_listener_assisted(&self, database: &str) -> Result<()> {
        self.repository
            .delete(&node_path::listener_assisted(database))
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for ComputeNodePersistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeNodePersistService")
            .field("repository", &self.repository.name())
            .finish()
    }
}
