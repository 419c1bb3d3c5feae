//! This node and its view of the cluster.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use shardmesh_core::{ClusterState, ComputeNodeInstance, InstanceAttributes, InstanceState, InstanceType};
use tracing::{debug, info};

/// Tracks this instance, online cluster members and the cluster state.
pub struct InstanceContext {
    instance: ArcSwap<ComputeNodeInstance>,
    members: DashMap<String, ComputeNodeInstance>,
    cluster_state: ArcSwap<ClusterState>,
}

impl InstanceContext {
    pub fn new(instance: ComputeNodeInstance) -> Self {
        Self {
            instance: ArcSwap::from_pointee(instance),
            members: DashMap::new(),
            cluster_state: ArcSwap::from_pointee(ClusterState::Ok),
        }
    }

    /// This instance.
    pub fn instance(&self) -> Arc<ComputeNodeInstance> {
        self.instance.load_full()
    }

    pub fn id(&self) -> String {
        self.instance.load().id.clone()
    }

    pub fn is_self(&self, instance_id: &str) -> bool {
        self.instance.load().id == instance_id
    }

    pub fn cluster_state(&self) -> ClusterState {
        **self.cluster_state.load()
    }

    pub fn set_cluster_state(&self, state: ClusterState) {
        let previous = **self.cluster_state.load();
        if previous != state {
            info!(from = %previous, to = %state, "Cluster state changed");
        }
        self.cluster_state.store(Arc::new(state));
    }

    /// Record `instance` as an online member, keeping any known node state.
    pub fn add_member(&self, instance: ComputeNodeInstance) {
        debug!(instance_id = %instance.id, "Cluster member online");
        self.members.insert(instance.id.clone(), instance);
    }

    pub fn on_online(&self, instance_id: &str, instance_type: InstanceType, attributes: InstanceAttributes) {
        let mut entry = self
            .members
            .entry(instance_id.to_string())
            .or_insert_with(|| ComputeNodeInstance::new(instance_id, instance_type.clone()));
        info!(instance_id = %instance_id, instance_type = %instance_type, "Cluster member online");
        entry.instance_type = instance_type;
        entry.attributes = attributes;
    }

    pub fn on_offline(&self, instance_id: &str) {
        if self.members.remove(instance_id).is_some() {
            info!(instance_id = %instance_id, "Cluster member offline");
        }
    }

    pub fn update_worker_id(&self, instance_id: &str, worker_id: Option<u32>) {
        self.update(instance_id, |instance| instance.worker_id = worker_id);
    }

    pub fn update_labels(&self, instance_id: &str, labels: Vec<String>) {
        self.update(instance_id, move |instance| instance.labels = labels.clone());
    }

    pub fn update_state(&self, instance_id: &str, state: InstanceState) {
        self.update(instance_id, |instance| instance.state = state);
    }

    /// Apply `change` to this instance and to the matching member, if online.
    fn update<F>(&self, instance_id: &str, change: F)
    where
        F: Fn(&mut ComputeNodeInstance),
    {
        if self.is_self(instance_id) {
            self.instance.rcu(|current| {
                let mut next = ComputeNodeInstance::clone(current);
                change(&mut next);
                next
            });
        }
        if let Some(mut member) = self.members.get_mut(instance_id) {
            change(member.value_mut());
        }
    }

    pub fn member(&self, instance_id: &str) -> Option<ComputeNodeInstance> {
        self.members.get(instance_id).map(|m| m.value().clone())
    }

    pub fn is_online(&self, instance_id: &str) -> bool {
        self.members.contains_key(instance_id)
    }

    /// Online members ordered by id.
    pub fn online_instances(&self) -> Vec<ComputeNodeInstance> {
        let mut instances: Vec<_> = self.members.iter().map(|m| m.value().clone()).collect();
        instances.sort_by(|a, b| a.id.cmp(&b.id));
        instances
    }
}

impl std::fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceContext")
            .field("instance_id", &self.id())
            .field("members", &self.members.len())
            .field("cluster_state", &self.cluster_state())
            .finish()
    }
}
