use shardmesh_core::{ChangeType, DataChangedEvent};
use shardmesh_persist::RuleItemPath;
use shardmesh_persist::node_path::{self, METADATA_ROOT};

use super::DispatchBuilder;
use crate::event::{AlterRuleItemEvent, DispatchEvent, DropRuleItemEvent};

/// `/metadata/{db}/rules/{ruleType}[/{itemType}[/{itemName}]]/active_version`
/// → alter or drop of one rule item.
pub struct RuleItemBuilder;

impl DispatchBuilder for RuleItemBuilder {
    fn name(&self) -> &str {
        "rule_item"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{METADATA_ROOT}/")]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        ChangeType::all()
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        node_path::strip_active_version(&event.key)?;
        let path = RuleItemPath::parse(&event.key)?;
        match event.event_type {
            ChangeType::Added | ChangeType::Updated => {
                let active_version = event.value.trim().parse().ok()?;
                let active_version_key = path.key();
                Some(DispatchEvent::AlterRuleItem(AlterRuleItemEvent {
                    database: path.database,
                    rule_type: path.rule_type,
                    item_type: path.item_type,
                    item_name: path.item_name,
                    active_version_key,
                    active_version,
                }))
            }
            ChangeType::Deleted => Some(DispatchEvent::DropRuleItem(DropRuleItemEvent {
                database: path.database,
                rule_type: path.rule_type,
                item_type: path.item_type,
                item_name: path.item_name,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_item_alter() {
        let event = DataChangedEvent::added(
            "/metadata/foo_db/rules/sharding/auditors/foo_algo/active_version",
            "3",
        );
        assert_eq!(
            RuleItemBuilder.build(&event),
            Some(DispatchEvent::AlterRuleItem(AlterRuleItemEvent {
                database: "foo_db".into(),
                rule_type: "sharding".into(),
                item_type: Some("auditors".into()),
                item_name: Some("foo_algo".into()),
                active_version_key: "/metadata/foo_db/rules/sharding/auditors/foo_algo".into(),
                active_version: 3,
            }))
        );
    }

    #[test]
    fn test_unique_item_drop() {
        let event = DataChangedEvent::deleted(
            "/metadata/foo_db/rules/sharding/default_sharding_column/active_version",
        );
        assert_eq!(
            RuleItemBuilder.build(&event),
            Some(DispatchEvent::DropRuleItem(DropRuleItemEvent {
                database: "foo_db".into(),
                rule_type: "sharding".into(),
                item_type: Some("default_sharding_column".into()),
                item_name: None,
            }))
        );
    }

    #[test]
    fn test_only_active_version_leaves_match() {
        for key in [
            "/metadata/foo_db/rules/sharding/auditors/foo_algo/versions/0",
            "/metadata/foo_db/rules/sharding/auditors/foo_algo",
            "/metadata/foo_db/data_sources/units/ds_0/active_version",
        ] {
            assert_eq!(RuleItemBuilder.build(&DataChangedEvent::added(key, "0")), None);
        }
    }

    #[test]
    fn test_malformed_version_yields_nothing() {
        let event = DataChangedEvent::updated("/metadata/db/rules/single/active_version", "x");
        assert_eq!(RuleItemBuilder.build(&event), None);
    }
}
