use std::sync::Arc;

use shardmesh_core::{DataChangedEvent, InstanceType};
use shardmesh_dispatch::{ChangeDispatcher, DispatchBuilderRegistry, DispatchEvent};
use shardmesh_repository::{MemoryRepository, RepositoryClient};
use tokio::sync::mpsc;

#[test]
fn test_online_event_matches_exactly_one_builder() {
    let registry = DispatchBuilderRegistry::with_defaults();
    let event = DataChangedEvent::added("/nodes/compute_nodes/online/proxy/node-1", "{}");

    let produced: Vec<_> = registry
        .builders()
        .iter()
        .filter(|b| b.matches(&event))
        .filter_map(|b| b.build(&event).map(|e| (b.name().to_string(), e)))
        .collect();

    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].0, "compute_node_online");
    match &produced[0].1 {
        DispatchEvent::InstanceOnline { instance_id, instance_type, .. } => {
            assert_eq!(instance_id, "node-1");
            assert_eq!(*instance_type, InstanceType::Proxy);
        }
        other => panic!("Expected InstanceOnline, got {other:?}"),
    }
}

#[test]
fn test_online_event_of_any_instance_type() {
    let registry = DispatchBuilderRegistry::with_defaults();
    let event = DataChangedEvent::added("/nodes/compute_nodes/online/compute_db_instance/node-1", "{}");

    let produced: Vec<_> = registry
        .builders()
        .iter()
        .filter(|b| b.matches(&event))
        .filter_map(|b| b.build(&event).map(|e| (b.name().to_string(), e)))
        .collect();

    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].0, "compute_node_online");
    match &produced[0].1 {
        DispatchEvent::InstanceOnline { instance_id, instance_type, .. } => {
            assert_eq!(instance_id, "node-1");
            assert_eq!(*instance_type, InstanceType::Other("compute_db_instance".into()));
        }
        other => panic!("Expected InstanceOnline, got {other:?}"),
    }
}

#[test]
fn test_each_leaf_shape_has_a_single_producer() {
    let dispatcher = ChangeDispatcher::new(DispatchBuilderRegistry::with_defaults());
    let events = [
        DataChangedEvent::added("/nodes/compute_nodes/worker_id/node-1", "3"),
        DataChangedEvent::added("/nodes/compute_nodes/show_process_list_trigger/node-1:t", ""),
        DataChangedEvent::added("/metadata/db/rules/sharding/tables/t_order/active_version", "0"),
        DataChangedEvent::added("/metadata/db/data_sources/units/ds_0/active_version", "0"),
        DataChangedEvent::added("/rules/authority/active_version", "0"),
        DataChangedEvent::added("/props/active_version", "0"),
        DataChangedEvent::added("/states/cluster_state", "OK"),
        DataChangedEvent::added("/states/listener_assisted/db", "CREATE_DATABASE"),
    ];
    for event in events {
        assert_eq!(dispatcher.dispatch(&event).len(), 1, "key {}", event.key);
    }
}

#[tokio::test]
async fn test_run_drains_repository_watch() {
    let repository = MemoryRepository::new();
    let dispatcher = Arc::new(ChangeDispatcher::new(DispatchBuilderRegistry::with_defaults()));
    let mut events = dispatcher.subscribe();

    let (tx, rx) = mpsc::channel(16);
    let watch = repository.watch("/", tx).await.unwrap();
    let runner = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run(rx).await })
    };

    repository
        .persist("/nodes/compute_nodes/online/jdbc/node-7", "{}")
        .await
        .unwrap();
    repository.persist("/states/cluster_state", "READ_ONLY").await.unwrap();

    let first = events.recv().await.unwrap();
    assert!(matches!(first, DispatchEvent::InstanceOnline { ref instance_id, .. } if instance_id == "node-7"));
    let second = events.recv().await.unwrap();
    assert_eq!(second.kind(), "cluster_state_changed");

    watch.stop().await;
    runner.await.unwrap();
}
