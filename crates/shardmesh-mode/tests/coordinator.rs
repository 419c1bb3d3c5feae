mod common;

use std::sync::Arc;

use common::{CounterConfig, CounterProcessor, FixtureFactory, Probe, instance_context};
use shardmesh_dispatch::{AlterRuleItemEvent, DropRuleItemEvent};
use shardmesh_mode::{
    Database, DatabaseLocks, MetaDataHandle, MetaDataSnapshot, ModeError, ReconcileOutcome,
    RuleFactoryRegistry, RuleItemCoordinator, RuleItemProcessorRegistry, RuleReconciler,
};
use shardmesh_persist::{JsonRuleConfigurationSwapper, MetaDataPersistService, SwapperRegistry};
use shardmesh_repository::MemoryRepository;

const ROOT_KEY: &str = "/metadata/db/rules/counter";

struct Fixture {
    handle: MetaDataHandle,
    persist: Arc<MetaDataPersistService>,
    coordinator: RuleItemCoordinator,
}

fn fixture() -> Fixture {
    let repository = Arc::new(MemoryRepository::new());
    let swappers = SwapperRegistry::new()
        .with(Arc::new(JsonRuleConfigurationSwapper::<CounterConfig>::new("counter")));
    let persist = Arc::new(MetaDataPersistService::new(repository, Arc::new(swappers)));
    let handle = MetaDataHandle::new(
        MetaDataSnapshot::empty().with_database(Arc::new(Database::new("db"))),
    );
    let factories = RuleFactoryRegistry::new()
        .with(Arc::new(FixtureFactory::new("counter", Arc::new(Probe::default()))));
    let reconciler = Arc::new(RuleReconciler::new(
        handle.clone(),
        Arc::new(factories),
        instance_context(0),
        DatabaseLocks::new(),
    ));
    let processors = RuleItemProcessorRegistry::new().with(Arc::new(CounterProcessor));
    let coordinator = RuleItemCoordinator::new(persist.clone(), reconciler, Arc::new(processors));
    Fixture {
        handle,
        persist,
        coordinator,
    }
}

fn alter_event(version: u64) -> AlterRuleItemEvent {
    AlterRuleItemEvent {
        database: "db".into(),
        rule_type: "counter".into(),
        item_type: None,
        item_name: None,
        active_version_key: ROOT_KEY.into(),
        active_version: version,
    }
}

fn current_counter(handle: &MetaDataHandle) -> Option<CounterConfig> {
    handle.load().databases["db"].rules.configuration::<CounterConfig>()
}

#[tokio::test]
async fn test_alter_applies_active_version() {
    let fx = fixture();
    fx.persist
        .database_rules()
        .persist("db", &CounterConfig::new("hits", 3))
        .await
        .unwrap();

    let outcome = fx.coordinator.alter_rule_item(&alter_event(0)).await.unwrap();

    assert!(matches!(outcome, Some(ReconcileOutcome::Rebuilt { .. })));
    assert_eq!(current_counter(&fx.handle), Some(CounterConfig::new("hits", 3)));
}

#[tokio::test]
async fn test_stale_alter_event_is_skipped() {
    let fx = fixture();
    let rules = fx.persist.database_rules();
    rules.persist("db", &CounterConfig::new("hits", 3)).await.unwrap();
    // Version 1 is written but never activated.
    rules.persist("db", &CounterConfig::new("hits", 4)).await.unwrap();
    let generation = fx.handle.generation();

    let outcome = fx.coordinator.alter_rule_item(&alter_event(1)).await.unwrap();

    assert!(outcome.is_none());
    assert_eq!(fx.handle.generation(), generation);
}

#[tokio::test]
async fn test_apply_rule_item_by_path() {
    let fx = fixture();
    fx.persist
        .database_rules()
        .persist("db", &CounterConfig::new("hits", 9))
        .await
        .unwrap();

    fx.coordinator
        .apply_rule_item("/metadata/db/rules/counter/active_version")
        .await
        .unwrap();

    assert_eq!(current_counter(&fx.handle), Some(CounterConfig::new("hits", 9)));
}

#[tokio::test]
async fn test_drop_to_empty_removes_rules() {
    let fx = fixture();
    fx.persist
        .database_rules()
        .persist("db", &CounterConfig::new("hits", 3))
        .await
        .unwrap();
    fx.coordinator.alter_rule_item(&alter_event(0)).await.unwrap();

    let outcome = fx
        .coordinator
        .drop_rule_item(&DropRuleItemEvent {
            database: "db".into(),
            rule_type: "counter".into(),
            item_type: None,
            item_name: None,
        })
        .await
        .unwrap();

    assert!(matches!(outcome, Some(ReconcileOutcome::Rebuilt { removed: 1, added: 0, .. })));
    assert!(current_counter(&fx.handle).is_none());
}

#[tokio::test]
async fn test_drop_for_unknown_database_is_ignored() {
    let fx = fixture();
    let outcome = fx
        .coordinator
        .drop_rule_item_at("/metadata/other/rules/counter")
        .await
        .unwrap();
    assert!(outcome.is_none());
}

#[tokio::test]
async fn test_failures_are_wrapped_once() {
    let fx = fixture();
    fx.persist
        .store()
        .persist("/metadata/db/rules/counter/limits/a", "1")
        .await
        .unwrap();
    let event = AlterRuleItemEvent {
        item_type: Some("limits".into()),
        item_name: Some("a".into()),
        active_version_key: "/metadata/db/rules/counter/limits/a".into(),
        ..alter_event(0)
    };

    let err = fx.coordinator.alter_rule_item(&event).await.unwrap_err();

    match &err {
        ModeError::OperationFailed { operation, target, source } => {
            assert_eq!(operation, "alter rule item");
            assert_eq!(target, "/metadata/db/rules/counter/limits/a");
            assert!(matches!(**source, ModeError::ProcessorNotFound(_)));
        }
        other => panic!("expected wrapped error, got {other:?}"),
    }

    let err = fx.coordinator.apply_rule_item("/somewhere/else").await.unwrap_err();
    assert!(matches!(err.root_cause(), ModeError::InvalidPath(_)));
}
