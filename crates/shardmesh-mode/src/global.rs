//! Global rules and configuration properties.

use std::sync::Arc;

use shardmesh_core::{ConfigurationProperties, RuleConfiguration};
use shardmesh_persist::MetaDataPersistService;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::factory::{GlobalRuleBuildContext, RuleFactoryRegistry};
use crate::instance::InstanceContext;
use crate::reconciler::{ReconcileOutcome, dispose_all};
use crate::snapshot::MetaDataHandle;
use crate::{ModeError, Result};

/// Reacts to property changes after they are published.
pub trait PropertiesChangedListener: Send + Sync {
    fn name(&self) -> &str;

    /// Property keys this listener cares about.
    fn watched_keys(&self) -> Vec<String>;

    /// Called with the published properties and the watched keys that changed.
    fn on_properties_changed(&self, props: &ConfigurationProperties, changed_keys: &[String]);
}

/// Applies global rule and property changes to the published snapshot.
pub struct GlobalConfigurationManager {
    persist: Arc<MetaDataPersistService>,
    handle: MetaDataHandle,
    factories: Arc<RuleFactoryRegistry>,
    instance: Arc<InstanceContext>,
    listeners: Vec<Arc<dyn PropertiesChangedListener>>,
    lock: Mutex<()>,
}

impl GlobalConfigurationManager {
    pub fn new(
        persist: Arc<MetaDataPersistService>,
        handle: MetaDataHandle,
        factories: Arc<RuleFactoryRegistry>,
        instance: Arc<InstanceContext>,
        listeners: Vec<Arc<dyn PropertiesChangedListener>>,
    ) -> Self {
        Self {
            persist,
            handle,
            factories,
            instance,
            listeners,
            lock: Mutex::new(()),
        }
    }

    pub fn listeners(&self) -> &[Arc<dyn PropertiesChangedListener>] {
        &self.listeners
    }

    /// Replace the global rules of `config`'s family with freshly built ones.
    pub async fn alter_global_rule_configuration(
        &self,
        config: Arc<dyn RuleConfiguration>,
    ) -> Result<ReconcileOutcome> {
        let rule_type = config.rule_type().to_string();
        self.try_alter_global_rule(config)
            .await
            .map_err(|err| ModeError::operation_failed("alter global rule", rule_type, err))
    }

    async fn try_alter_global_rule(&self, config: Arc<dyn RuleConfiguration>) -> Result<ReconcileOutcome> {
        let _guard = self.lock.lock().await;
        let snapshot = self.handle.load();
        let factory = self.factories.require(config.rule_type())?;

        let (kept, _) = snapshot.global_rules.replace_family(config.as_ref(), Vec::new());
        let context = GlobalRuleBuildContext {
            databases: &snapshot.databases,
            existing_rules: kept.rules(),
            props: &snapshot.props,
            instance: &self.instance,
        };
        let built = factory.build_global(&context, config.clone())?;
        let added = built.len();

        let (rules, removed) = snapshot.global_rules.replace_family(config.as_ref(), built);
        let published = self.handle.update(|s| s.with_global_rules(rules.clone()));
        info!(
            rule_type = %config.rule_type(),
            removed = removed.len(),
            added,
            generation = published.generation,
            "Published global rules"
        );

        dispose_all("global rules", &removed)?;
        Ok(ReconcileOutcome::Rebuilt {
            generation: published.generation,
            removed: removed.len(),
            added,
        })
    }

    /// Remove every global rule with `rule_type`.
    pub async fn remove_global_rules(&self, rule_type: &str) -> Result<ReconcileOutcome> {
        let _guard = self.lock.lock().await;
        let snapshot = self.handle.load();
        let (rules, removed) = snapshot.global_rules.remove_type(rule_type);
        if removed.is_empty() {
            return Ok(ReconcileOutcome::Unchanged);
        }
        let published = self.handle.update(|s| s.with_global_rules(rules.clone()));
        info!(rule_type = %rule_type, generation = published.generation, "Removed global rules");

        dispose_all("global rules", &removed)
            .map_err(|err| ModeError::operation_failed("remove global rule", rule_type, err))?;
        Ok(ReconcileOutcome::Rebuilt {
            generation: published.generation,
            removed: removed.len(),
            added: 0,
        })
    }

    /// Publish `props` and notify listeners whose watched keys changed.
    ///
    /// Returns every changed key.
    pub async fn alter_properties(&self, props: ConfigurationProperties) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        let previous = self.handle.load();
        let changed = previous.props.changed_keys(&props);
        if changed.is_empty() {
            debug!("Properties unchanged");
            return Ok(changed);
        }
        let published = self.handle.update(|s| s.with_props(props.clone()));
        info!(changed = ?changed, generation = published.generation, "Published properties");

        for listener in &self.listeners {
            let relevant: Vec<String> = listener
                .watched_keys()
                .into_iter()
                .filter(|key| changed.contains(key))
                .collect();
            if relevant.is_empty() {
                continue;
            }
            debug!(listener = %listener.name(), keys = ?relevant, "Notifying properties listener");
            listener.on_properties_changed(&published.props, &relevant);
        }
        Ok(changed)
    }

    /// Reload the active configuration of a global rule type from the store.
    pub async fn reload_global_rule(&self, rule_type: &str) -> Result<ReconcileOutcome> {
        let loaded = self
            .persist
            .global_rules()
            .load(rule_type)
            .await
            .map_err(|err| ModeError::operation_failed("reload global rule", rule_type, err.into()))?;
        match loaded {
            Some(config) => self.alter_global_rule_configuration(config).await,
            None => self.remove_global_rules(rule_type).await,
        }
    }

    /// Reload the active properties from the store.
    pub async fn reload_properties(&self) -> Result<Vec<String>> {
        let props = self
            .persist
            .props()
            .load()
            .await
            .map_err(|err| ModeError::operation_failed("reload properties", "/props", err.into()))?;
        self.alter_properties(props).await
    }
}

impl std::fmt::Debug for GlobalConfigurationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listeners: Vec<&str> = self.listeners.iter().map(|l| l.name()).collect();
        f.debug_struct("GlobalConfigurationManager")
            .field("factories", &self.factories)
            .field("listeners", &listeners)
            .finish()
    }
}
