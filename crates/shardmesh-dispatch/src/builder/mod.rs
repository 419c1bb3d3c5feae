//! Dispatch builders.
//!
//! A builder declares the key prefixes and change types it listens to and
//! turns a matching raw event into at most one [`DispatchEvent`]. A key that
//! matches a prefix but not the builder's leaf shape yields `None`; malformed
//! values degrade to a safe default instead of failing.

mod cluster_state;
mod compute_node;
mod global_rule;
mod listener_assisted;
mod process_list;
mod rule_item;
mod storage_unit;

use std::sync::Arc;

use shardmesh_core::{ChangeType, DataChangedEvent};
use tracing::debug;

use crate::event::DispatchEvent;

pub use cluster_state::ClusterStateBuilder;
pub use compute_node::{ComputeNodeOnlineBuilder, ComputeNodeStatusBuilder};
pub use global_rule::GlobalRuleBuilder;
pub use listener_assisted::ListenerAssistedBuilder;
pub use process_list::ProcessListBuilder;
pub use rule_item::RuleItemBuilder;
pub use storage_unit::StorageUnitBuilder;

/// Converts matching raw repository events into typed events.
pub trait DispatchBuilder: Send + Sync {
    /// Unique name for this builder (for logging).
    fn name(&self) -> &str;

    /// Key prefixes this builder is interested in.
    fn subscribed_keys(&self) -> Vec<String>;

    /// Change types this builder reacts to.
    fn subscribed_types(&self) -> &'static [ChangeType];

    /// Build a typed event, or `None` when the key is not a recognized leaf.
    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent>;

    /// Check if this builder should see the given event.
    fn matches(&self, event: &DataChangedEvent) -> bool {
        self.subscribed_types().contains(&event.event_type)
            && self
                .subscribed_keys()
                .iter()
                .any(|prefix| event.key.starts_with(prefix.as_str()))
    }
}

/// Explicit, ordered set of builders owned by one dispatcher.
#[derive(Clone, Default)]
pub struct DispatchBuilderRegistry {
    builders: Vec<Arc<dyn DispatchBuilder>>,
}

impl DispatchBuilderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in builder.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ComputeNodeOnlineBuilder));
        registry.register(Arc::new(ComputeNodeStatusBuilder));
        registry.register(Arc::new(ClusterStateBuilder));
        registry.register(Arc::new(ProcessListBuilder));
        registry.register(Arc::new(RuleItemBuilder));
        registry.register(Arc::new(GlobalRuleBuilder));
        registry.register(Arc::new(StorageUnitBuilder));
        registry.register(Arc::new(ListenerAssistedBuilder::new()));
        registry
    }

    pub fn register(&mut self, builder: Arc<dyn DispatchBuilder>) {
        debug!(builder = %builder.name(), "Registered dispatch builder");
        self.builders.push(builder);
    }

    pub fn builders(&self) -> &[Arc<dyn DispatchBuilder>] {
        &self.builders
    }

    /// Builders whose prefix and type filters accept `event`.
    pub fn matching<'a>(
        &'a self,
        event: &'a DataChangedEvent,
    ) -> impl Iterator<Item = &'a Arc<dyn DispatchBuilder>> + 'a {
        self.builders.iter().filter(move |b| b.matches(event))
    }

    pub fn len(&self) -> usize {
        self.builders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl std::fmt::Debug for DispatchBuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchBuilderRegistry")
            .field(
                "builders",
                &self.builders.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
