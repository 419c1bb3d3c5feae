use std::sync::Arc;
use std::time::Duration;

use shardmesh_core::{DataSourcePoolProperties, RuleConfiguration};
use shardmesh_mode::{ContextManager, ModeConfig, ModeError, ReconcileOutcome};
use shardmesh_persist::{MetaDataPersistService, SwapperRegistry};
use shardmesh_repository::MemoryRepository;
use shardmesh_sharding::{
    AlgorithmConfiguration, ShardingRuleConfiguration, ShardingRuleConfigurationSwapper,
    ShardingStrategyConfiguration, ShardingTableRuleConfiguration,
};

const DATABASE: &str = "foo_db";
const AUDITORS: &str = "/metadata/foo_db/rules/sharding/auditors";

fn mode_config(id: &str) -> ModeConfig {
    let mut config = ModeConfig::default();
    config.instance.id = Some(id.to_string());
    config
}

async fn manager(repository: Arc<MemoryRepository>, id: &str) -> ContextManager {
    shardmesh_sharding::install(ContextManager::builder(mode_config(id)).repository(repository))
        .build()
        .await
        .unwrap()
}

async fn with_storage_units(manager: &ContextManager) {
    manager.create_database(DATABASE).await.unwrap();
    for name in ["ds_0", "ds_1"] {
        manager
            .register_storage_unit(
                DATABASE,
                name,
                DataSourcePoolProperties::new(format!("mysql://127.0.0.1:3306/{name}")),
            )
            .await
            .unwrap();
    }
}

fn auditors(names: &[(&str, &str)]) -> ShardingRuleConfiguration {
    let mut config = ShardingRuleConfiguration::new();
    for (name, algorithm_type) in names {
        config
            .auditors
            .insert(name.to_string(), AlgorithmConfiguration::new(*algorithm_type));
    }
    config
}

fn order_configuration() -> ShardingRuleConfiguration {
    let mut config = ShardingRuleConfiguration::new();
    let mut order = ShardingTableRuleConfiguration::new("t_order", "ds_${0..1}.t_order_${0..1}");
    order.table_strategy = Some(ShardingStrategyConfiguration::standard("order_id", "table_inline"));
    config.add_table(order);
    config
        .sharding_algorithms
        .insert("table_inline".into(), AlgorithmConfiguration::new("INLINE"));
    config.default_database_sharding_strategy = Some(ShardingStrategyConfiguration::None);
    config
}

fn current(manager: &ContextManager) -> Option<ShardingRuleConfiguration> {
    manager
        .snapshot()
        .database(DATABASE)
        .and_then(|db| db.rules.configuration::<ShardingRuleConfiguration>())
}

async fn persist_item(manager: &ContextManager, key: &str, content: &str) {
    let store = manager.persist().store();
    let receipt = store.persist(key, content).await.unwrap();
    store
        .switch_active_versions(std::slice::from_ref(&receipt))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_alter_auditor_item() {
    let manager = manager(Arc::new(MemoryRepository::new()), "node-1").await;
    with_storage_units(&manager).await;
    manager
        .alter_rule_configuration(DATABASE, Arc::new(auditors(&[("foo_algo", "FOO_FIXTURE")])))
        .await
        .unwrap();

    let key = format!("{AUDITORS}/bar_algo");
    persist_item(&manager, &key, r#"{"type":"BAR_FIXTURE"}"#).await;
    let outcome = manager.apply_rule_item(&key).await.unwrap();

    assert!(matches!(outcome, Some(ReconcileOutcome::Rebuilt { .. })));
    let config = current(&manager).unwrap();
    assert_eq!(config.auditors.len(), 2);
    assert_eq!(config.auditors["foo_algo"].algorithm_type, "FOO_FIXTURE");
    assert_eq!(config.auditors["bar_algo"].algorithm_type, "BAR_FIXTURE");
}

#[tokio::test]
async fn test_drop_last_auditor_removes_rule() {
    let manager = manager(Arc::new(MemoryRepository::new()), "node-1").await;
    with_storage_units(&manager).await;
    manager
        .alter_rule_configuration(DATABASE, Arc::new(auditors(&[("foo_algo", "FOO_FIXTURE")])))
        .await
        .unwrap();

    manager
        .drop_rule_item(&format!("{AUDITORS}/foo_algo"))
        .await
        .unwrap();

    assert!(current(&manager).is_none());
    let snapshot = manager.snapshot();
    assert!(snapshot.database(DATABASE).unwrap().rules.find_by_type("sharding").is_none());
    let stored = manager
        .persist()
        .database_rules()
        .load(DATABASE, "sharding")
        .await
        .unwrap();
    assert!(stored.is_none());
}

#[tokio::test]
async fn test_default_strategy_item_round_trip() {
    let manager = manager(Arc::new(MemoryRepository::new()), "node-1").await;
    with_storage_units(&manager).await;
    manager
        .alter_rule_configuration(DATABASE, Arc::new(order_configuration()))
        .await
        .unwrap();

    let key = "/metadata/foo_db/rules/sharding/default_table_strategy";
    persist_item(&manager, key, "\"none\"").await;
    manager.apply_rule_item(key).await.unwrap();

    let config = current(&manager).unwrap();
    assert_eq!(
        config.default_table_sharding_strategy,
        Some(ShardingStrategyConfiguration::None)
    );
    assert_eq!(
        config.default_database_sharding_strategy,
        Some(ShardingStrategyConfiguration::None)
    );
}

#[tokio::test]
async fn test_invalid_table_keeps_published_rule() {
    let manager = manager(Arc::new(MemoryRepository::new()), "node-1").await;
    with_storage_units(&manager).await;
    manager
        .alter_rule_configuration(DATABASE, Arc::new(order_configuration()))
        .await
        .unwrap();
    let generation = manager.handle().generation();

    let key = "/metadata/foo_db/rules/sharding/tables/t_user";
    persist_item(&manager, key, r#"{"logic_table":"t_user","actual_data_nodes":"ds_9.t_user"}"#).await;
    let err = manager.apply_rule_item(key).await.unwrap_err();

    assert!(matches!(err, ModeError::OperationFailed { .. }));
    assert!(matches!(err.root_cause(), ModeError::Build { rule_type, .. } if rule_type == "sharding"));
    assert_eq!(manager.handle().generation(), generation);
    assert_eq!(current(&manager), Some(order_configuration()));
}

#[tokio::test]
async fn test_bootstrap_restores_sharding_rule() {
    let repository = Arc::new(MemoryRepository::new());
    {
        let seeder = manager(repository.clone(), "seeder").await;
        with_storage_units(&seeder).await;
        seeder
            .alter_rule_configuration(DATABASE, Arc::new(order_configuration()))
            .await
            .unwrap();
        seeder.stop().await.unwrap();
    }

    let manager = manager(repository.clone(), "node-1").await;
    assert_eq!(current(&manager), Some(order_configuration()));

    let persist = MetaDataPersistService::new(
        repository,
        Arc::new(SwapperRegistry::new().with(Arc::new(ShardingRuleConfigurationSwapper::new()))),
    );
    let stored = persist.database_rules().load(DATABASE, "sharding").await.unwrap().unwrap();
    assert!(!stored.is_empty());
}

#[tokio::test]
async fn test_remote_items_reach_running_node() {
    let repository = Arc::new(MemoryRepository::new());
    let manager = manager(repository.clone(), "node-1").await;
    with_storage_units(&manager).await;
    manager.start().await.unwrap();

    let remote = MetaDataPersistService::new(
        repository,
        Arc::new(SwapperRegistry::new().with(Arc::new(ShardingRuleConfigurationSwapper::new()))),
    );
    let receipts = remote
        .database_rules()
        .persist(DATABASE, &order_configuration())
        .await
        .unwrap();
    remote.store().switch_active_versions(&receipts).await.unwrap();

    let mut applied = false;
    for _ in 0..200 {
        if current(&manager) == Some(order_configuration()) {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(applied);

    manager.stop().await.unwrap();
}
