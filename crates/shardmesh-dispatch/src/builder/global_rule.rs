use std::sync::LazyLock;

use regex::Regex;
use shardmesh_core::{ChangeType, DataChangedEvent};
use shardmesh_persist::node_path::{self, GLOBAL_RULES_ROOT, PROPS};

use super::DispatchBuilder;
use crate::event::DispatchEvent;

static GLOBAL_RULE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/rules/([^/]+)/active_version$").expect("Invalid global rule regex")
});

/// Active version changes of global rules and properties.
pub struct GlobalRuleBuilder;

impl DispatchBuilder for GlobalRuleBuilder {
    fn name(&self) -> &str {
        "global_rule"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![format!("{GLOBAL_RULES_ROOT}/"), PROPS.to_string()]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        &[ChangeType::Added, ChangeType::Updated]
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        if event.key == node_path::active_version(PROPS) {
            let active_version = event.value.trim().parse().ok()?;
            return Some(DispatchEvent::PropertiesAltered { active_version });
        }
        let caps = GLOBAL_RULE_REGEX.captures(&event.key)?;
        Some(DispatchEvent::GlobalRuleAltered {
            rule_type: caps.get(1)?.as_str().to_string(),
            active_version: event.value.trim().parse().ok()?,
        })
    }
}
