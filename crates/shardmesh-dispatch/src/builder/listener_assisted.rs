use std::sync::LazyLock;

use dashmap::DashMap;
use regex::Regex;
use shardmesh_core::{ChangeType, DataChangedEvent, ListenerAssistedType};
use shardmesh_persist::node_path::STATES_ROOT;

use super::DispatchBuilder;
use crate::event::DispatchEvent;

static LISTENER_ASSISTED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/states/listener_assisted/([^/]+)$").expect("Invalid listener assisted regex")
});

/// Transient database lifecycle markers.
///
/// A marker value is acted on once per key; writing the same value again is
/// ignored until the marker node is deleted.
#[derive(Default)]
pub struct ListenerAssistedBuilder {
    last_seen: DashMap<String, ListenerAssistedType>,
}

impl ListenerAssistedBuilder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchBuilder for ListenerAssistedBuilder {
    fn name(&self) -> &str {
        "listener_assisted"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{STATES_ROOT}/listener_assisted/")]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        ChangeType::all()
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        let caps = LISTENER_ASSISTED_REGEX.captures(&event.key)?;
        let database = caps.get(1)?.as_str().to_string();
        if event.event_type == ChangeType::Deleted {
            self.last_seen.remove(&event.key);
            return None;
        }
        let assisted = ListenerAssistedType::parse(&event.value)?;
        if self.last_seen.insert(event.key.clone(), assisted) == Some(assisted) {
            return None;
        }
        Some(match assisted {
            ListenerAssistedType::CreateDatabase => DispatchEvent::DatabaseCreated { database },
            ListenerAssistedType::DropDatabase => DispatchEvent::DatabaseDropped { database },
        })
    }
}
