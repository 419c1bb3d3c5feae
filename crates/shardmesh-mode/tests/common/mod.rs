#![allow(dead_code)]

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardmesh_core::{
    ComputeNodeInstance, CoreError, DisposableRule, InstanceType, PartialUpdateRule, Rule,
    RuleChangedItemType, RuleConfiguration, RuleScope,
};
use shardmesh_mode::{
    Database, GlobalRuleBuildContext, InstanceContext, MetaDataHandle, ModeError, RuleBuildContext,
    RuleFactory, RuleItemConfigurationChangedProcessor,
};

/// Database rule whose `limit` can change in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterConfig {
    pub name: String,
    pub limit: u64,
}

impl CounterConfig {
    pub fn new(name: &str, limit: u64) -> Self {
        Self {
            name: name.to_string(),
            limit,
        }
    }
}

impl RuleConfiguration for CounterConfig {
    fn rule_type(&self) -> &str {
        "counter"
    }

    fn is_empty(&self) -> bool {
        self.name.is_empty()
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

/// A second database rule family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeConfig {
    pub unit: String,
}

impl RuleConfiguration for GaugeConfig {
    fn rule_type(&self) -> &str {
        "gauge"
    }

    fn is_empty(&self) -> bool {
        self.unit.is_empty()
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

/// A global rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub zone: String,
}

impl RuleConfiguration for ClockConfig {
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

/// What a disposed rule saw when it was disposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposal {
    pub rule_type: String,
    pub generation: u64,
}

#[derive(Debug, Default)]
pub struct Probe {
    pub builds: AtomicUsize,
    pub disposals: Mutex<Vec<Disposal>>,
    pub fail_dispose: AtomicBool,
    /// Worker id seen by each successful build.
    pub worker_ids: Mutex<Vec<Option<u32>>>,
}

impl Probe {
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn disposals(&self) -> Vec<Disposal> {
        self.disposals.lock().unwrap().clone()
    }

    pub fn worker_ids(&self) -> Vec<Option<u32>> {
        self.worker_ids.lock().unwrap().clone()
    }
}

/// This node as `node-1` holding `worker_id`.
pub fn instance_context(worker_id: u32) -> Arc<InstanceContext> {
    let context = InstanceContext::new(ComputeNodeInstance::new("node-1", InstanceType::Proxy));
    context.update_worker_id("node-1", Some(worker_id));
    Arc::new(context)
}

#[derive(Debug)]
pub struct FixtureRule {
    config: RwLock<Arc<dyn RuleConfiguration>>,
    probe: Arc<Probe>,
    handle: Option<MetaDataHandle>,
    partial: bool,
}

impl FixtureRule {
    pub fn new(config: Arc<dyn RuleConfiguration>, probe: Arc<Probe>, handle: Option<MetaDataHandle>) -> Self {
        let partial = config.downcast_ref::<CounterConfig>().is_some();
        Self {
            config: RwLock::new(config),
            probe,
            handle,
            partial,
        }
    }
}

impl Rule for FixtureRule {
    fn configuration(&self) -> Arc<dyn RuleConfiguration> {
        self.config.read().unwrap().clone()
    }

    fn as_partial_update(&self) -> Option<&dyn PartialUpdateRule> {
        self.partial.then_some(self as &dyn PartialUpdateRule)
    }

    fn as_disposable(&self) -> Option<&dyn DisposableRule> {
        Some(self)
    }
}

impl PartialUpdateRule for FixtureRule {
    /// Same counter name means only the limit changed.
    fn partial_update(&self, config: &dyn RuleConfiguration) -> bool {
        let current = self.configuration();
        match (current.downcast_ref::<CounterConfig>(), config.downcast_ref::<CounterConfig>()) {
            (Some(current), Some(next)) => current.name == next.name,
            _ => false,
        }
    }

    fn update_configuration(&self, config: Arc<dyn RuleConfiguration>) {
        *self.config.write().unwrap() = config;
    }
}

impl DisposableRule for FixtureRule {
    fn dispose(&self) -> Result<(), CoreError> {
        let generation = self.handle.as_ref().map_or(0, MetaDataHandle::generation);
        let rule_type = self.configuration().rule_type().to_string();
        self.probe.disposals.lock().unwrap().push(Disposal {
            rule_type: rule_type.clone(),
            generation,
        });
        if self.probe.fail_dispose.load(Ordering::SeqCst) {
            return Err(CoreError::dispose(rule_type, "connection pool refused to close"));
        }
        Ok(())
    }
}

/// Factory for every fixture family. Counters with `limit == 0` fail to build.
pub struct FixtureFactory {
    rule_type: &'static str,
    probe: Arc<Probe>,
    handle: Option<MetaDataHandle>,
    rules_per_config: usize,
}

impl FixtureFactory {
    pub fn new(rule_type: &'static str, probe: Arc<Probe>) -> Self {
        Self {
            rule_type,
            probe,
            handle: None,
            rules_per_config: 1,
        }
    }

    pub fn observing(mut self, handle: MetaDataHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn rules_per_config(mut self, count: usize) -> Self {
        self.rules_per_config = count;
        self
    }

    fn make(
        &self,
        instance: &InstanceContext,
        config: Arc<dyn RuleConfiguration>,
    ) -> shardmesh_mode::Result<Vec<Arc<dyn Rule>>> {
        if config.downcast_ref::<CounterConfig>().is_some_and(|c| c.limit == 0) {
            return Err(ModeError::build(self.rule_type, "limit must be > 0"));
        }
        self.probe.builds.fetch_add(1, Ordering::SeqCst);
        self.probe
            .worker_ids
            .lock()
            .unwrap()
            .push(instance.instance().worker_id);
        Ok((0..self.rules_per_config)
            .map(|_| {
                Arc::new(FixtureRule::new(config.clone(), self.probe.clone(), self.handle.clone()))
                    as Arc<dyn Rule>
            })
            .collect())
    }
}

impl RuleFactory for FixtureFactory {
    fn rule_type(&self) -> &str {
        self.rule_type
    }

    fn build(
        &self,
        context: &RuleBuildContext<'_>,
        config: Arc<dyn RuleConfiguration>,
    ) -> shardmesh_mode::Result<Vec<Arc<dyn Rule>>> {
        self.make(context.instance, config)
    }

    fn build_global(
        &self,
        context: &GlobalRuleBuildContext<'_>,
        config: Arc<dyn RuleConfiguration>,
    ) -> shardmesh_mode::Result<Vec<Arc<dyn Rule>>> {
        self.make(context.instance, config)
    }
}

/// Whole-root processor for counters: the item content is the full config.
pub struct CounterProcessor;

impl RuleItemConfigurationChangedProcessor for CounterProcessor {
    fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::root("counter")
    }

    fn find_rule_configuration(&self, database: &Database) -> Box<dyn RuleConfiguration> {
        Box::new(database.rules.configuration::<CounterConfig>().unwrap_or_default())
    }

    fn change_rule_item_configuration(
        &self,
        _item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
        content: &str,
    ) -> shardmesh_mode::Result<()> {
        let next: CounterConfig = serde_json::from_str(content)
            .map_err(|e| ModeError::invalid_item("counter", e.to_string()))?;
        let current = current
            .downcast_mut::<CounterConfig>()
            .ok_or_else(|| ModeError::unexpected_configuration("counter"))?;
        *current = next;
        Ok(())
    }

    fn drop_rule_item_configuration(
        &self,
        _item_name: Option<&str>,
        current: &mut dyn RuleConfiguration,
    ) -> shardmesh_mode::Result<()> {
        let current = current
            .downcast_mut::<CounterConfig>()
            .ok_or_else(|| ModeError::unexpected_configuration("counter"))?;
        *current = CounterConfig::default();
        Ok(())
    }
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
