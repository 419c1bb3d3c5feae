use std::any::Any;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use shardmesh_core::{
    ClusterState, ComputeNodeInstance, ConfigurationProperties, DataSourcePoolProperties,
    InstanceAttributes, InstanceState, InstanceType, RuleConfiguration, RuleScope,
};
use shardmesh_persist::{
    JsonRuleConfigurationSwapper, MAX_WORKER_ID, MetaDataPersistService, PersistError, RepositoryTuple,
    RuleConfigurationSwapper, RuleItemPath, SwapperRegistry,
};
use shardmesh_repository::{MemoryRepository, RepositoryClient};

#[derive(Debug, Clone, Default, PartialEq)]
struct TagsRuleConfiguration {
    tags: IndexMap<String, String>,
}

impl RuleConfiguration for TagsRuleConfiguration {
    fn rule_type(&self) -> &str {
        "tags"
    }

    fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_config(&self) -> Box<dyn RuleConfiguration> {
        Box::new(self.clone())
    }
}

struct TagsSwapper;

impl RuleConfigurationSwapper for TagsSwapper {
    fn rule_type(&self) -> &str {
        "tags"
    }

    fn swap_to_tuples(
        &self,
        config: &dyn RuleConfiguration,
    ) -> shardmesh_persist::Result<Vec<RepositoryTuple>> {
        let config = config
            .downcast_ref::<TagsRuleConfiguration>()
            .ok_or_else(|| PersistError::UnexpectedConfiguration("tags".into()))?;
        Ok(config
            .tags
            .iter()
            .map(|(k, v)| RepositoryTuple::new(format!("tags/{k}"), v.clone()))
            .collect())
    }

    fn swap_to_object(
        &self,
        tuples: &[RepositoryTuple],
    ) -> shardmesh_persist::Result<Option<Box<dyn RuleConfiguration>>> {
        let tags: IndexMap<String, String> = tuples
            .iter()
            .filter_map(|t| Some((t.item_name()?.to_string(), t.value.clone())))
            .collect();
        Ok((!tags.is_empty()).then(|| Box::new(TagsRuleConfiguration { tags }) as Box<dyn RuleConfiguration>))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClockRuleConfiguration {
    zone: String,
}

impl RuleConfiguration for ClockRuleConfiguration {
    fn rule_type(&self) -> &str {
        "clock"
    }

    fn scope(&self) -> RuleScope {
        RuleScope::Global
    }

    fn is_empty(&self) -> bool {
        self.zone.is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_config(&self) -> Box<dyn RuleConfiguration> {
        Box::new(self.clone())
    }
}

fn service() -> (Arc<MemoryRepository>, MetaDataPersistService) {
    let repository = Arc::new(MemoryRepository::new());
    let swappers = SwapperRegistry::new()
        .with(Arc::new(TagsSwapper))
        .with(Arc::new(JsonRuleConfigurationSwapper::<ClockRuleConfiguration>::new("clock")));
    let service = MetaDataPersistService::new(repository.clone(), Arc::new(swappers));
    (repository, service)
}

fn tags(pairs: &[(&str, &str)]) -> TagsRuleConfiguration {
    TagsRuleConfiguration {
        tags: pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    }
}

#[tokio::test]
async fn test_database_rule_persist_and_load() {
    let (repository, service) = service();
    let receipts = service
        .database_rules()
        .persist("foo_db", &tags(&[("a", "1"), ("b", "2")]))
        .await
        .unwrap();

    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[0].path, "/metadata/foo_db/rules/tags/tags/a");
    assert_eq!(
        repository
            .get("/metadata/foo_db/rules/tags/tags/b/versions/0")
            .await
            .unwrap()
            .as_deref(),
        Some("2")
    );

    let loaded = service.database_rules().load_all("foo_db").await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(
        loaded[0].downcast_ref::<TagsRuleConfiguration>(),
        Some(&tags(&[("a", "1"), ("b", "2")]))
    );
}

#[tokio::test]
async fn test_database_rule_persist_removes_stale_items() {
    let (_repository, service) = service();
    let rules = service.database_rules();
    rules.persist("db", &tags(&[("a", "1"), ("b", "2")])).await.unwrap();

    let receipts = rules.persist("db", &tags(&[("a", "3")])).await.unwrap();
    assert_eq!(receipts.len(), 2);
    assert_eq!(receipts[0].new_version, Some(1));
    assert!(receipts[1].is_tombstone());

    service.store().switch_active_versions(&receipts).await.unwrap();
    let loaded = rules.load("db", "tags").await.unwrap().unwrap();
    assert_eq!(
        loaded.downcast_ref::<TagsRuleConfiguration>(),
        Some(&tags(&[("a", "3")]))
    );
}

#[tokio::test]
async fn test_load_item_follows_active_version() {
    let (_repository, service) = service();
    let rules = service.database_rules();
    rules.persist("db", &tags(&[("a", "1")])).await.unwrap();
    let receipts = rules.persist("db", &tags(&[("a", "2")])).await.unwrap();

    let item = RuleItemPath::new("db", "tags", Some("tags"), Some("a"));
    assert_eq!(rules.load_item(&item).await.unwrap().as_deref(), Some("1"));

    service.store().switch_active_versions(&receipts).await.unwrap();
    assert_eq!(rules.load_item(&item).await.unwrap().as_deref(), Some("2"));

    let missing = RuleItemPath::new("db", "tags", Some("tags"), Some("zzz"));
    assert!(rules.load_item(&missing).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_items_and_rule_type() {
    let (_repository, service) = service();
    let rules = service.database_rules();
    let config = tags(&[("a", "1"), ("b", "2")]);
    rules.persist("db", &config).await.unwrap();

    let receipts = rules.delete_items("db", &config).await.unwrap();
    assert_eq!(receipts[0].path, "/metadata/db/rules/tags/tags/b");
    assert_eq!(receipts[1].path, "/metadata/db/rules/tags/tags/a");
    assert!(rules.load("db", "tags").await.unwrap().is_none());

    rules.persist("db", &config).await.unwrap();
    rules.delete("db", "tags").await.unwrap();
    assert!(rules.load_all("db").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_rule_type_is_rejected() {
    let (_repository, service) = service();
    let err = service.database_rules().load("db", "unknown").await.unwrap_err();
    assert!(matches!(err, PersistError::SwapperNotFound(_)));
}

#[tokio::test]
async fn test_global_rule_and_props() {
    let (_repository, service) = service();
    let clock = ClockRuleConfiguration { zone: "UTC".into() };
    service.global_rules().persist(&clock).await.unwrap();

    let loaded = service.global_rules().load_all().await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].downcast_ref::<ClockRuleConfiguration>(), Some(&clock));

    assert!(service.props().load().await.unwrap().is_empty());
    let props = ConfigurationProperties::new().with("sql-show", "true");
    service.props().persist(&props).await.unwrap();
    assert_eq!(service.props().load().await.unwrap(), props);
}

#[tokio::test]
async fn test_storage_units_and_databases() {
    let (_repository, service) = service();
    service.databases().add("foo_db").await.unwrap();
    let ds = DataSourcePoolProperties::new("jdbc:mysql://127.0.0.1/ds_0");
    service.storage_units().persist("foo_db", "ds_0", &ds).await.unwrap();

    assert_eq!(service.databases().load_all_names().await.unwrap(), vec!["foo_db"]);
    let units = service.storage_units().load_all("foo_db").await.unwrap();
    assert_eq!(units.get("ds_0"), Some(&ds));

    service.databases().drop("foo_db").await.unwrap();
    assert!(!service.databases().exists("foo_db").await.unwrap());
    assert!(service.storage_units().load_all("foo_db").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_compute_node_registration() {
    let (repository, service) = service();
    let nodes = service.compute_nodes();
    let instance = ComputeNodeInstance::new("node-1", InstanceType::Proxy)
        .with_attributes(InstanceAttributes {
            host: "10.0.0.1".into(),
            port: 3307,
            version: "1.0".into(),
        })
        .with_labels(vec!["blue".into()]);

    nodes.register_online(&instance).await.unwrap();
    assert_eq!(nodes.assign_worker_id("node-1").await.unwrap(), 0);
    assert_eq!(nodes.assign_worker_id("node-2").await.unwrap(), 1);
    assert_eq!(nodes.assign_worker_id("node-1").await.unwrap(), 0);

    let online = nodes.load_online_instances().await.unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].attributes.port, 3307);
    assert_eq!(online[0].labels, vec!["blue"]);
    assert_eq!(online[0].worker_id, Some(0));

    repository
        .persist("/nodes/compute_nodes/status/node-1", "bogus")
        .await
        .unwrap();
    assert_eq!(nodes.load_state("node-1").await.unwrap(), InstanceState::Ok);

    nodes.persist_cluster_state(ClusterState::ReadOnly).await.unwrap();
    assert_eq!(nodes.load_cluster_state().await.unwrap(), ClusterState::ReadOnly);

    nodes.offline(&instance).await.unwrap();
    assert!(nodes.load_online_instances().await.unwrap().is_empty());
    assert_eq!(nodes.load_worker_id("node-1").await.unwrap(), None);
    assert_eq!(nodes.assign_worker_id("node-3").await.unwrap(), 0);
}

#[tokio::test]
async fn test_worker_ids_are_reused_after_offline() {
    let (_repository, service) = service();
    let nodes = service.compute_nodes();
    for round in 0..=MAX_WORKER_ID {
        let instance = ComputeNodeInstance::new(format!("node-{round}"), InstanceType::Proxy);
        nodes.register_online(&instance).await.unwrap();
        assert_eq!(nodes.assign_worker_id(&instance.id).await.unwrap(), 0);
        nodes.offline(&instance).await.unwrap();
    }
    assert!(nodes.assigned_worker_ids().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_online_instances_of_any_type() {
    let (_repository, service) = service();
    let nodes = service.compute_nodes();
    let other = InstanceType::parse("compute_db_instance");
    nodes
        .register_online(&ComputeNodeInstance::new("node-1", other.clone()))
        .await
        .unwrap();
    nodes
        .register_online(&ComputeNodeInstance::new("node-2", InstanceType::Jdbc))
        .await
        .unwrap();

    let mut online: Vec<_> = nodes
        .load_online_instances()
        .await
        .unwrap()
        .into_iter()
        .map(|i| (i.id, i.instance_type))
        .collect();
    online.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        online,
        vec![("node-1".to_string(), other), ("node-2".to_string(), InstanceType::Jdbc)]
    );
}
