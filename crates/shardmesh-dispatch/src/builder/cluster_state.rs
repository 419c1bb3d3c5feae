use shardmesh_core::{ChangeType, ClusterState, DataChangedEvent};
use shardmesh_persist::node_path;

use super::DispatchBuilder;
use crate::event::DispatchEvent;

/// `/states/cluster_state` → cluster state change.
pub struct ClusterStateBuilder;

impl DispatchBuilder for ClusterStateBuilder {
    fn name(&self) -> &str {
        "cluster_state"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![node_path::cluster_state()]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        &[ChangeType::Added, ChangeType::Updated]
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        (event.key == node_path::cluster_state()).then(|| DispatchEvent::ClusterStateChanged {
            state: ClusterState::parse_or_default(&event.value),
        })
    }
}
