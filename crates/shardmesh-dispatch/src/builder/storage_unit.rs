use std::sync::LazyLock;

use regex::Regex;
use shardmesh_core::{ChangeType, DataChangedEvent};
use shardmesh_persist::node_path::METADATA_ROOT;

use super::DispatchBuilder;
use crate::event::DispatchEvent;

static STORAGE_UNIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/metadata/([^/]+)/data_sources/units/([^/]+)/active_version$")
        .expect("Invalid storage unit regex")
});

/// Storage unit registration, alteration and removal.
pub struct StorageUnitBuilder;

impl DispatchBuilder for StorageUnitBuilder {
    fn name(&self) -> &str {
        "storage_unit"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{METADATA_ROOT}/")]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        ChangeType::all()
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        let caps = STORAGE_UNIT_REGEX.captures(&event.key)?;
        let database = caps.get(1)?.as_str().to_string();
        let name = caps.get(2)?.as_str().to_string();
        match event.event_type {
            ChangeType::Added => Some(DispatchEvent::StorageUnitRegistered {
                database,
                name,
                active_version: event.value.trim().parse().ok()?,
            }),
            ChangeType::Updated => Some(DispatchEvent::StorageUnitAltered {
                database,
                name,
                active_version: event.value.trim().parse().ok()?,
            }),
            ChangeType::Deleted => Some(DispatchEvent::StorageUnitUnregistered { database, name }),
        }
    }
}
