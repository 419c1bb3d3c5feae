//! Change dispatcher.
//!
//! Feeds raw repository events through the builder registry and broadcasts
//! every typed result. Builders never fail, so one bad notification cannot
//! stall the watch channel.

use shardmesh_core::DataChangedEvent;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace};

use crate::builder::DispatchBuilderRegistry;
use crate::event::DispatchEvent;

/// Default buffer size for the typed event channel.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Routes raw events to builders and fans typed events out to subscribers.
pub struct ChangeDispatcher {
    registry: DispatchBuilderRegistry,
    sender: broadcast::Sender<DispatchEvent>,
}

impl ChangeDispatcher {
    pub fn new(registry: DispatchBuilderRegistry) -> Self {
        Self::with_capacity(registry, DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(registry: DispatchBuilderRegistry, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { registry, sender }
    }

    pub fn registry(&self) -> &DispatchBuilderRegistry {
        &self.registry
    }

    /// Build and broadcast every typed event `event` maps to.
    ///
    /// More than one builder may match the same raw event; callers must not
    /// assume a single result.
    pub fn dispatch(&self, event: &DataChangedEvent) -> Vec<DispatchEvent> {
        let mut dispatched = Vec::new();
        for builder in self.registry.matching(event) {
            let Some(typed) = builder.build(event) else {
                trace!(builder = %builder.name(), key = %event.key, "Builder skipped event");
                continue;
            };
            let receivers = self.sender.send(typed.clone()).unwrap_or_default();
            debug!(
                builder = %builder.name(),
                key = %event.key,
                event_type = %event.event_type,
                kind = typed.kind(),
                receivers,
                "Dispatched event"
            );
            dispatched.push(typed);
        }
        dispatched
    }

    /// Subscribe to typed events broadcast after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Drain a repository watch channel until it closes.
    pub async fn run(&self, mut receiver: mpsc::Receiver<DataChangedEvent>) {
        info!("Starting change dispatcher");
        while let Some(event) = receiver.recv().await {
            self.dispatch(&event);
        }
        info!("Change dispatcher channel closed, stopping");
    }
}

impl std::fmt::Debug for ChangeDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeDispatcher")
            .field("registry", &self.registry)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
