use std::sync::LazyLock;

use regex::Regex;
use shardmesh_core::{
    ChangeType, DataChangedEvent, InstanceAttributes, InstanceState, InstanceType,
};
use shardmesh_persist::node_path::COMPUTE_NODES_ROOT;

use super::DispatchBuilder;
use crate::event::DispatchEvent;

static ONLINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/nodes/compute_nodes/online/([^/]+)/([^/]+)$").expect("Invalid online regex")
});

static STATUS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/nodes/compute_nodes/(worker_id|labels|status)/([^/]+)$")
        .expect("Invalid compute node status regex")
});

/// `/nodes/compute_nodes/online/{type}/{id}` → instance online / offline.
pub struct ComputeNodeOnlineBuilder;

impl DispatchBuilder for ComputeNodeOnlineBuilder {
    fn name(&self) -> &str {
        "compute_node_online"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{COMPUTE_NODES_ROOT}/online/")]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        &[ChangeType::Added, ChangeType::Deleted]
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        let caps = ONLINE_REGEX.captures(&event.key)?;
        let instance_type = InstanceType::parse(caps.get(1)?.as_str());
        let instance_id = caps.get(2)?.as_str().to_string();
        match event.event_type {
            ChangeType::Added => Some(DispatchEvent::InstanceOnline {
                instance_id,
                instance_type,
                attributes: InstanceAttributes::decode_or_default(&event.value),
            }),
            ChangeType::Deleted => Some(DispatchEvent::InstanceOffline {
                instance_id,
                instance_type,
            }),
            ChangeType::Updated => None,
        }
    }
}

/// `/nodes/compute_nodes/{worker_id|labels|status}/{id}` → node-scoped changes.
pub struct ComputeNodeStatusBuilder;

impl DispatchBuilder for ComputeNodeStatusBuilder {
    fn name(&self) -> &str {
        "compute_node_status"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{COMPUTE_NODES_ROOT}/")]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        ChangeType::all()
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        let caps = STATUS_REGEX.captures(&event.key)?;
        let instance_id = caps.get(2)?.as_str().to_string();
        let deleted = event.event_type == ChangeType::Deleted;
        match caps.get(1)?.as_str() {
            "worker_id" => Some(DispatchEvent::WorkerIdChanged {
                instance_id,
                worker_id: if deleted {
                    None
                } else {
                    event.value.trim().parse().ok()
                },
            }),
            "labels" if !deleted => Some(DispatchEvent::LabelsChanged {
                instance_id,
                labels: serde_json::from_str(&event.value).unwrap_or_default(),
            }),
            "status" if !deleted => Some(DispatchEvent::ComputeNodeStateChanged {
                instance_id,
                state: InstanceState::parse_or_default(&event.value),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_and_offline() {
        let added = DataChangedEvent::added(
            "/nodes/compute_nodes/online/proxy/node-1",
            r#"{"host":"10.0.0.2","port":3307,"version":"1"}"#,
        );
        match ComputeNodeOnlineBuilder.build(&added) {
            Some(DispatchEvent::InstanceOnline { instance_id, instance_type, attributes }) => {
                assert_eq!(instance_id, "node-1");
                assert_eq!(instance_type, InstanceType::Proxy);
                assert_eq!(attributes.port, 3307);
            }
            other => panic!("Expected InstanceOnline, got {other:?}"),
        }

        let deleted = DataChangedEvent::deleted("/nodes/compute_nodes/online/jdbc/node-2");
        assert_eq!(
            ComputeNodeOnlineBuilder.build(&deleted),
            Some(DispatchEvent::InstanceOffline {
                instance_id: "node-2".into(),
                instance_type: InstanceType::Jdbc,
            })
        );
    }

    #[test]
    fn test_online_malformed_attributes_degrade() {
        let added = DataChangedEvent::added("/nodes/compute_nodes/online/proxy/node-1", "{{");
        match ComputeNodeOnlineBuilder.build(&added) {
            Some(DispatchEvent::InstanceOnline { attributes, .. }) => {
                assert_eq!(attributes, InstanceAttributes::default());
            }
            other => panic!("Expected InstanceOnline, got {other:?}"),
        }
    }

    #[test]
    fn test_online_keeps_unknown_type() {
        let deleted = DataChangedEvent::deleted("/nodes/compute_nodes/online/compute_db_instance/node-3");
        assert_eq!(
            ComputeNodeOnlineBuilder.build(&deleted),
            Some(DispatchEvent::InstanceOffline {
                instance_id: "node-3".into(),
                instance_type: InstanceType::Other("compute_db_instance".into()),
            })
        );
    }

    #[test]
    fn test_online_rejects_other_shapes() {
        for key in [
            "/nodes/compute_nodes/online/proxy",
            "/nodes/compute_nodes/online/proxy/node-1/extra",
        ] {
            assert_eq!(ComputeNodeOnlineBuilder.build(&DataChangedEvent::added(key, "")), None);
        }
    }

    #[test]
    fn test_status_values_degrade() {
        let worker = DataChangedEvent::updated("/nodes/compute_nodes/worker_id/node-1", "oops");
        assert_eq!(
            ComputeNodeStatusBuilder.build(&worker),
            Some(DispatchEvent::WorkerIdChanged {
                instance_id: "node-1".into(),
                worker_id: None,
            })
        );

        let labels = DataChangedEvent::added("/nodes/compute_nodes/labels/node-1", "not json");
        assert_eq!(
            ComputeNodeStatusBuilder.build(&labels),
            Some(DispatchEvent::LabelsChanged {
                instance_id: "node-1".into(),
                labels: Vec::new(),
            })
        );

        let status = DataChangedEvent::added("/nodes/compute_nodes/status/node-1", "CIRCUIT_BREAK");
        assert_eq!(
            ComputeNodeStatusBuilder.build(&status),
            Some(DispatchEvent::ComputeNodeStateChanged {
                instance_id: "node-1".into(),
                state: InstanceState::CircuitBreak,
            })
        );

        let labels_deleted = DataChangedEvent::deleted("/nodes/compute_nodes/labels/node-1");
        assert_eq!(ComputeNodeStatusBuilder.build(&labels_deleted), None);
    }
}
