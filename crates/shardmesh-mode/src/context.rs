//! Context manager: bootstrap, watch loop and administrative API.

use std::collections::BTreeMap;
use std::sync::Arc;

use shardmesh_core::{
    ClusterState, ConfigurationProperties, DataSourcePoolProperties, ListenerAssistedType,
    RuleConfiguration,
};
use shardmesh_dispatch::{ChangeDispatcher, DispatchBuilderRegistry, DispatchEvent};
use shardmesh_persist::{
    MetaDataPersistService, RuleConfigurationSwapper, RuleItemPath, SwapperRegistry, node_path,
};
use shardmesh_repository::{MemoryRepository, RepositoryClient, WatchHandle};
use time::OffsetDateTime;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{ModeConfig, RepositoryKind};
use crate::coordinator::{
    RuleItemConfigurationChangedProcessor, RuleItemCoordinator, RuleItemProcessorRegistry,
};
use crate::factory::{RuleFactory, RuleFactoryRegistry, build_database_rules, build_global_rules};
use crate::global::{GlobalConfigurationManager, PropertiesChangedListener};
use crate::instance::InstanceContext;
use crate::reconciler::{DatabaseLocks, ReconcileOutcome, RuleReconciler};
use crate::snapshot::{Database, MetaDataHandle, MetaDataSnapshot, RuleMetaData};
use crate::storage_unit::StorageUnitManager;
use crate::{ModeError, Result};

/// Assembles a [`ContextManager`] from explicit registries.
pub struct ContextManagerBuilder {
    config: ModeConfig,
    repository: Option<Arc<dyn RepositoryClient>>,
    swappers: SwapperRegistry,
    factories: RuleFactoryRegistry,
    processors: RuleItemProcessorRegistry,
    dispatch_builders: Option<DispatchBuilderRegistry>,
    listeners: Vec<Arc<dyn PropertiesChangedListener>>,
}

impl ContextManagerBuilder {
    pub fn new(config: ModeConfig) -> Self {
        Self {
            config,
            repository: None,
            swappers: SwapperRegistry::new(),
            factories: RuleFactoryRegistry::new(),
            processors: RuleItemProcessorRegistry::new(),
            dispatch_builders: None,
            listeners: Vec::new(),
        }
    }

    /// Use `repository` instead of the one named in the configuration.
    pub fn repository(mut self, repository: Arc<dyn RepositoryClient>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn swapper(mut self, swapper: Arc<dyn RuleConfigurationSwapper>) -> Self {
        self.swappers.register(swapper);
        self
    }

    pub fn factory(mut self, factory: Arc<dyn RuleFactory>) -> Self {
        self.factories.register(factory);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn RuleItemConfigurationChangedProcessor>) -> Self {
        self.processors.register(processor);
        self
    }

    pub fn dispatch_builders(mut self, registry: DispatchBuilderRegistry) -> Self {
        self.dispatch_builders = Some(registry);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn PropertiesChangedListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Load the first snapshot from the repository and register this
    /// instance online.
    pub async fn build(self) -> Result<ContextManager> {
        self.config.validate()?;
        let repository: Arc<dyn RepositoryClient> = match self.repository {
            Some(repository) => repository,
            None => match self.config.repository.kind {
                RepositoryKind::Memory => Arc::new(MemoryRepository::new()),
            },
        };
        let persist = Arc::new(MetaDataPersistService::new(
            repository.clone(),
            Arc::new(self.swappers),
        ));
        let factories = Arc::new(self.factories);

        let instance = Arc::new(InstanceContext::new(self.config.compute_node_instance()));
        register_instance(&persist, &instance).await?;

        let snapshot = match load_snapshot(&persist, &factories, &instance, &self.config).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                if let Err(offline) = persist.compute_nodes().offline(&instance.instance()).await {
                    warn!(error = %offline, "Failed to take instance offline after bootstrap failure");
                }
                return Err(err);
            }
        };
        info!(
            databases = snapshot.databases.len(),
            global_rules = snapshot.global_rules.len(),
            "Loaded metadata snapshot"
        );
        let handle = MetaDataHandle::new(snapshot);

        let reconciler = Arc::new(RuleReconciler::new(
            handle.clone(),
            factories.clone(),
            instance.clone(),
            DatabaseLocks::new(),
        ));
        let coordinator = Arc::new(RuleItemCoordinator::new(
            persist.clone(),
            reconciler.clone(),
            Arc::new(self.processors),
        ));
        let global = Arc::new(GlobalConfigurationManager::new(
            persist.clone(),
            handle.clone(),
            factories,
            instance.clone(),
            self.listeners,
        ));
        let storage_units = Arc::new(StorageUnitManager::new(persist.clone(), reconciler.clone()));
        let dispatcher = Arc::new(ChangeDispatcher::with_capacity(
            self.dispatch_builders
                .unwrap_or_else(DispatchBuilderRegistry::with_defaults),
            self.config.dispatch.event_buffer_size,
        ));

        Ok(ContextManager {
            config: self.config,
            repository,
            persist,
            handle,
            reconciler,
            coordinator,
            global,
            storage_units,
            instance,
            dispatcher,
            running: Mutex::new(None),
        })
    }
}

async fn load_snapshot(
    persist: &MetaDataPersistService,
    factories: &RuleFactoryRegistry,
    instance: &InstanceContext,
    config: &ModeConfig,
) -> Result<MetaDataSnapshot> {
    if !config.props.is_empty()
        && persist.store().active_version(node_path::PROPS).await?.is_none()
    {
        persist.props().persist(&config.props).await?;
        debug!(count = config.props.len(), "Persisted initial properties");
    }
    let props = persist.props().load().await?;

    let mut databases = BTreeMap::new();
    for name in persist.databases().load_all_names().await? {
        let storage_units = persist.storage_units().load_all(&name).await?;
        let configs = persist.database_rules().load_all(&name).await?;
        let rules = build_database_rules(factories, instance, &name, &storage_units, &configs, &props)?;
        debug!(database = %name, storage_units = storage_units.len(), rules = rules.len(), "Loaded database");
        let database = Database::new(name.as_str())
            .with_storage_units(storage_units)
            .with_rules(RuleMetaData::new(rules));
        databases.insert(name, Arc::new(database));
    }

    let global_configs = persist.global_rules().load_all().await?;
    let global_rules = build_global_rules(factories, instance, &databases, &global_configs, &props)?;

    Ok(MetaDataSnapshot {
        generation: 0,
        databases,
        global_rules: RuleMetaData::new(global_rules),
        props,
        published_at: OffsetDateTime::now_utc(),
    })
}

async fn register_instance(persist: &MetaDataPersistService, instance: &InstanceContext) -> Result<()> {
    let compute_nodes = persist.compute_nodes();
    let id = instance.id();
    let worker_id = compute_nodes.assign_worker_id(&id).await?;
    instance.update_worker_id(&id, Some(worker_id));
    compute_nodes.register_online(&instance.instance()).await?;

    for member in compute_nodes.load_online_instances().await? {
        instance.add_member(member);
    }
    instance.set_cluster_state(compute_nodes.load_cluster_state().await?);
    info!(instance_id = %id, worker_id, "Registered instance online");
    Ok(())
}

struct Running {
    watch: WatchHandle,
    pump: JoinHandle<()>,
    router: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Owns the published metadata of this node and keeps it in sync with the
/// repository.
pub struct ContextManager {
    config: ModeConfig,
    repository: Arc<dyn RepositoryClient>,
    persist: Arc<MetaDataPersistService>,
    handle: MetaDataHandle,
    reconciler: Arc<RuleReconciler>,
    coordinator: Arc<RuleItemCoordinator>,
    global: Arc<GlobalConfigurationManager>,
    storage_units: Arc<StorageUnitManager>,
    instance: Arc<InstanceContext>,
    dispatcher: Arc<ChangeDispatcher>,
    running: Mutex<Option<Running>>,
}

impl ContextManager {
    pub fn builder(config: ModeConfig) -> ContextManagerBuilder {
        ContextManagerBuilder::new(config)
    }

    pub fn config(&self) -> &ModeConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn RepositoryClient> {
        &self.repository
    }

    pub fn persist(&self) -> &Arc<MetaDataPersistService> {
        &self.persist
    }

    pub fn handle(&self) -> &MetaDataHandle {
        &self.handle
    }

    /// Current published snapshot.
    pub fn snapshot(&self) -> Arc<MetaDataSnapshot> {
        self.handle.load()
    }

    pub fn instance(&self) -> &Arc<InstanceContext> {
        &self.instance
    }

    pub fn dispatcher(&self) -> &Arc<ChangeDispatcher> {
        &self.dispatcher
    }

    pub fn reconciler(&self) -> &Arc<RuleReconciler> {
        &self.reconciler
    }

    pub fn coordinator(&self) -> &Arc<RuleItemCoordinator> {
        &self.coordinator
    }

    pub fn global(&self) -> &Arc<GlobalConfigurationManager> {
        &self.global
    }

    pub fn storage_units(&self) -> &Arc<StorageUnitManager> {
        &self.storage_units
    }

    /// Subscribe to the repository and start applying changes.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.config.dispatch.watch_channel_capacity);
        let events = self.dispatcher.subscribe();
        let watch = self.repository.watch("/", tx).await?;

        let dispatcher = self.dispatcher.clone();
        let pump = tokio::spawn(async move { dispatcher.run(rx).await });

        let (shutdown, shutdown_rx) = oneshot::channel();
        let router = EventRouter {
            persist: self.persist.clone(),
            reconciler: self.reconciler.clone(),
            coordinator: self.coordinator.clone(),
            global: self.global.clone(),
            storage_units: self.storage_units.clone(),
            instance: self.instance.clone(),
        };
        let router = tokio::spawn(router.run(events, shutdown_rx));

        *running = Some(Running {
            watch,
            pump,
            router,
            shutdown,
        });
        info!(instance_id = %self.instance.id(), repository = %self.repository.name(), "Context manager started");
        Ok(())
    }

    /// Stop watching, if started, and take this instance offline.
    pub async fn stop(&self) -> Result<()> {
        if let Some(running) = self.running.lock().await.take() {
            running.watch.stop().await;
            if let Err(err) = running.pump.await {
                warn!(error = %err, "Dispatcher task ended abnormally");
            }
            let _ = running.shutdown.send(());
            if let Err(err) = running.router.await {
                warn!(error = %err, "Event router task ended abnormally");
            }
        }

        self.persist
            .compute_nodes()
            .offline(&self.instance.instance())
            .await?;
        info!(instance_id = %self.instance.id(), "Context manager stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Apply `config` to the published snapshot without persisting it.
    pub async fn reconcile(
        &self,
        database: &str,
        config: Arc<dyn RuleConfiguration>,
        rebuild: bool,
    ) -> Result<ReconcileOutcome> {
        self.reconciler.reconcile(database, config, rebuild).await
    }

    pub async fn create_database(&self, database: &str) -> Result<bool> {
        let created = async {
            self.persist.databases().add(database).await?;
            let storage_units = self.persist.storage_units().load_all(database).await?;
            let created = self.reconciler.add_database(database, storage_units).await?;
            self.persist
                .compute_nodes()
                .mark_listener_assisted(database, ListenerAssistedType::CreateDatabase)
                .await?;
            Ok(created)
        };
        created
            .await
            .map_err(|err| ModeError::operation_failed("create database", database, err))
    }

    pub async fn drop_database(&self, database: &str) -> Result<bool> {
        let dropped = async {
            self.persist.databases().drop(database).await?;
            let dropped = self.reconciler.drop_database(database).await?;
            self.persist
                .compute_nodes()
                .mark_listener_assisted(database, ListenerAssistedType::DropDatabase)
                .await?;
            Ok(dropped)
        };
        dropped
            .await
            .map_err(|err| ModeError::operation_failed("drop database", database, err))
    }

    /// Persist `config`, activate every written item and apply it.
    pub async fn alter_rule_configuration(
        &self,
        database: &str,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<ReconcileOutcome> {
        let target = format!("{database}.{}", config.rule_type());
        let altered = async {
            let receipts = self
                .persist
                .database_rules()
                .persist(database, config.as_ref())
                .await?;
            self.persist.store().switch_active_versions(&receipts).await?;
            self.reconciler.reconcile(database, config.clone(), true).await
        };
        altered
            .await
            .map_err(|err| ModeError::operation_failed("alter rule configuration", target, err))
    }

    /// Delete a whole rule type of `database` and drop its rules.
    pub async fn drop_rule_configuration(&self, database: &str, rule_type: &str) -> Result<ReconcileOutcome> {
        let dropped = async {
            self.persist.database_rules().delete(database, rule_type).await?;
            self.reconciler.remove_rules(database, rule_type).await
        };
        dropped
            .await
            .map_err(|err| ModeError::operation_failed("drop rule configuration", format!("{database}.{rule_type}"), err))
    }

    pub async fn alter_global_rule_configuration(
        &self,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<ReconcileOutcome> {
        let receipts = self
            .persist
            .global_rules()
            .persist(config.as_ref())
            .await
            .map_err(|err| ModeError::operation_failed("alter global rule", config.rule_type(), err.into()))?;
        self.persist
            .store()
            .switch_active_versions(&receipts)
            .await
            .map_err(|err| ModeError::operation_failed("alter global rule", config.rule_type(), err.into()))?;
        self.global.alter_global_rule_configuration(config).await
    }

    /// Persist and publish new properties. Returns the changed keys.
    pub async fn alter_properties(&self, props: ConfigurationProperties) -> Result<Vec<String>> {
        let persisted = async {
            let receipt = self.persist.props().persist(&props).await?;
            self.persist
                .store()
                .switch_active_versions(std::slice::from_ref(&receipt))
                .await
        };
        persisted
            .await
            .map_err(|err| ModeError::operation_failed("alter properties", node_path::PROPS, err.into()))?;
        self.global.alter_properties(props).await
    }

    /// Apply the active version of the rule item at `path`.
    pub async fn apply_rule_item(&self, path: &str) -> Result<Option<ReconcileOutcome>> {
        self.coordinator.apply_rule_item(path).await
    }

    /// Delete the rule item at `path` and remove it from its configuration.
    pub async fn drop_rule_item(&self, path: &str) -> Result<Option<ReconcileOutcome>> {
        let item = RuleItemPath::parse(path).ok_or_else(|| {
            ModeError::operation_failed("drop rule item", path, ModeError::InvalidPath(path.to_string()))
        })?;
        self.persist
            .store()
            .delete(&item.key())
            .await
            .map_err(|err| ModeError::operation_failed("drop rule item", path, err.into()))?;
        self.coordinator.drop_rule_item_at(path).await
    }

    pub async fn register_storage_unit(
        &self,
        database: &str,
        name: &str,
        props: DataSourcePoolProperties,
    ) -> Result<ReconcileOutcome> {
        self.storage_units.register(database, name, props).await
    }

    pub async fn unregister_storage_unit(&self, database: &str, name: &str) -> Result<ReconcileOutcome> {
        self.persist
            .storage_units()
            .delete(database, name)
            .await
            .map_err(|err| ModeError::operation_failed("unregister storage unit", format!("{database}.{name}"), err.into()))?;
        self.storage_units.unregister(database, name).await
    }

    pub async fn set_cluster_state(&self, state: ClusterState) -> Result<()> {
        self.persist.compute_nodes().persist_cluster_state(state).await?;
        self.instance.set_cluster_state(state);
        Ok(())
    }
}

impl std::fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextManager")
            .field("repository", &self.repository.name())
            .field("generation", &self.handle.generation())
            .field("instance", &self.instance)
            .finish()
    }
}

/// Applies dispatched events to the local context.
struct EventRouter {
    persist: Arc<MetaDataPersistService>,
    reconciler: Arc<RuleReconciler>,
    coordinator: Arc<RuleItemCoordinator>,
    global: Arc<GlobalConfigurationManager>,
    storage_units: Arc<StorageUnitManager>,
    instance: Arc<InstanceContext>,
}

impl EventRouter {
    async fn run(self, mut events: broadcast::Receiver<DispatchEvent>, mut shutdown: oneshot::Receiver<()>) {
        info!("Starting event router");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Event router shutting down");
                    break;
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        let kind = event.kind();
                        if let Err(err) = self.route(event).await {
                            error!(kind, error = %err, "Failed to apply dispatched event");
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Event router lagged, missed events");
                    }
                    Err(RecvError::Closed) => {
                        info!("Dispatch channel closed, stopping event router");
                        break;
                    }
                }
            }
        }
    }

    async fn route(&self, event: DispatchEvent) -> Result<()> {
        match event {
            DispatchEvent::InstanceOnline {
                instance_id,
                instance_type,
                attributes,
            } => self.instance.on_online(&instance_id, instance_type, attributes),
            DispatchEvent::InstanceOffline { instance_id, .. } => self.instance.on_offline(&instance_id),
            DispatchEvent::WorkerIdChanged { instance_id, worker_id } => {
                self.instance.update_worker_id(&instance_id, worker_id);
            }
            DispatchEvent::LabelsChanged { instance_id, labels } => {
                self.instance.update_labels(&instance_id, labels);
            }
            DispatchEvent::ComputeNodeStateChanged { instance_id, state } => {
                self.instance.update_state(&instance_id, state);
            }
            DispatchEvent::ClusterStateChanged { state } => self.instance.set_cluster_state(state),
            DispatchEvent::AlterRuleItem(event) => {
                self.coordinator.alter_rule_item(&event).await?;
            }
            DispatchEvent::DropRuleItem(event) => {
                self.coordinator.drop_rule_item(&event).await?;
            }
            DispatchEvent::GlobalRuleAltered { rule_type, .. } => {
                self.global.reload_global_rule(&rule_type).await?;
            }
            DispatchEvent::PropertiesAltered { .. } => {
                self.global.reload_properties().await?;
            }
            DispatchEvent::StorageUnitRegistered { database, name, .. }
            | DispatchEvent::StorageUnitAltered { database, name, .. } => {
                self.storage_units.reload(&database, &name).await?;
            }
            DispatchEvent::StorageUnitUnregistered { database, name } => {
                self.storage_units.unregister(&database, &name).await?;
            }
            DispatchEvent::DatabaseCreated { database } => {
                let storage_units = self.persist.storage_units().load_all(&database).await?;
                self.reconciler.add_database(&database, storage_units).await?;
            }
            DispatchEvent::DatabaseDropped { database } => {
                self.reconciler.drop_database(&database).await?;
            }
            DispatchEvent::ShowProcessListRequested { instance_id, task_id } => {
                if self.instance.is_self(&instance_id) {
                    info!(task_id = %task_id, "Show process list requested");
                    self.persist
                        .compute_nodes()
                        .complete_show_process_list(&instance_id, &task_id)
                        .await?;
                }
            }
            DispatchEvent::ShowProcessListCompleted { instance_id, task_id } => {
                debug!(instance_id = %instance_id, task_id = %task_id, "Show process list completed");
            }
            DispatchEvent::KillProcessRequested { instance_id, process_id } => {
                if self.instance.is_self(&instance_id) {
                    info!(process_id = %process_id, "Kill process requested");
                    self.persist
                        .compute_nodes()
                        .complete_kill_process(&instance_id, &process_id)
                        .await?;
                }
            }
        }
        Ok(())
    }
}
