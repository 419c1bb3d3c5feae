//! Repository layout.
//!
//! ```text
//! /metadata/{db}/data_sources/units/{name}/versions/{n}
//! /metadata/{db}/rules/{ruleType}[/{itemType}[/{itemName}]]/versions/{n}
//! /rules/{ruleType}/versions/{n}
//! /props/versions/{n}
//! /nodes/compute_nodes/online/{instanceType}/{instanceId}
//! /nodes/compute_nodes/{worker_id|labels|status}/{instanceId}
//! /states/cluster_state
//! /states/listener_assisted/{db}
//! ```
//!
//! Every versioned logical key `K` has children `K/versions/{n}` and
//! `K/active_version`.

use std::sync::LazyLock;

use regex::Regex;
use shardmesh_core::{InstanceType, RuleChangedItemType};

pub const VERSIONS: &str = "versions";
pub const ACTIVE_VERSION: &str = "active_version";

pub const METADATA_ROOT: &str = "/metadata";
pub const GLOBAL_RULES_ROOT: &str = "/rules";
pub const PROPS: &str = "/props";
pub const COMPUTE_NODES_ROOT: &str = "/nodes/compute_nodes";
pub const STATES_ROOT: &str = "/states";

static RULE_ITEM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/metadata/([^/]+)/rules/([^/]+)(?:/([^/]+))?(?:/([^/]+))?$")
        .expect("Invalid rule item regex")
});

pub fn versions(key: &str) -> String {
    format!("{key}/{VERSIONS}")
}

pub fn version(key: &str, version: u64) -> String {
    format!("{key}/{VERSIONS}/{version}")
}

pub fn active_version(key: &str) -> String {
    format!("{key}/{ACTIVE_VERSION}")
}

/// Logical key of an `.../active_version` path.
pub fn strip_active_version(path: &str) -> Option<&str> {
    path.strip_suffix(ACTIVE_VERSION)?.strip_suffix('/')
}

pub fn database(database: &str) -> String {
    format!("{METADATA_ROOT}/{database}")
}

pub fn database_rules(database: &str) -> String {
    format!("{METADATA_ROOT}/{database}/rules")
}

pub fn database_rule(database: &str, rule_type: &str) -> String {
    format!("{METADATA_ROOT}/{database}/rules/{rule_type}")
}

pub fn storage_units(database: &str) -> String {
    format!("{METADATA_ROOT}/{database}/data_sources/units")
}

pub fn storage_unit(database: &str, name: &str) -> String {
    format!("{METADATA_ROOT}/{database}/data_sources/units/{name}")
}

pub fn global_rule(rule_type: &str) -> String {
    format!("{GLOBAL_RULES_ROOT}/{rule_type}")
}

pub fn compute_node_types() -> String {
    format!("{COMPUTE_NODES_ROOT}/online")
}

pub fn compute_nodes_online(instance_type: &InstanceType) -> String {
    format!("{COMPUTE_NODES_ROOT}/online/{instance_type}")
}

pub fn compute_node_online(instance_type: &InstanceType, instance_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/online/{instance_type}/{instance_id}")
}

pub fn worker_ids() -> String {
    format!("{COMPUTE_NODES_ROOT}/worker_id")
}

pub fn worker_id(instance_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/worker_id/{instance_id}")
}

pub fn labels(instance_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/labels/{instance_id}")
}

pub fn status(instance_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/status/{instance_id}")
}

pub fn show_process_list_trigger(instance_id: &str, task_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/show_process_list_trigger/{instance_id}:{task_id}")
}

pub fn kill_process_trigger(instance_id: &str, process_id: &str) -> String {
    format!("{COMPUTE_NODES_ROOT}/kill_process_trigger/{instance_id}:{process_id}")
}

pub fn cluster_state() -> String {
    format!("{STATES_ROOT}/cluster_state")
}

pub fn listener_assisted(database: &str) -> String {
    format!("{STATES_ROOT}/listener_assisted/{database}")
}

/// A parsed database rule item path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleItemPath {
    pub database: String,
    pub rule_type: String,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
}

impl RuleItemPath {
    pub fn new(
        database: impl Into<String>,
        rule_type: impl Into<String>,
        item_type: Option<&str>,
        item_name: Option<&str>,
    ) -> Self {
        Self {
            database: database.into(),
            rule_type: rule_type.into(),
            item_type: item_type.map(str::to_string),
            item_name: item_name.map(str::to_string),
        }
    }

    /// Parse either a logical item key or its `.../active_version` path.
    pub fn parse(path: &str) -> Option<Self> {
        let key = strip_active_version(path).unwrap_or(path);
        let caps = RULE_ITEM_REGEX.captures(key)?;
        let segment = |idx: usize| caps.get(idx).map(|m| m.as_str());
        let reserved = |s: &str| s == VERSIONS || s == ACTIVE_VERSION;

        let item_type = segment(3);
        let item_name = segment(4);
        if item_type.is_some_and(reserved) || item_name.is_some_and(reserved) {
            return None;
        }
        Some(Self::new(segment(1)?, segment(2)?, item_type, item_name))
    }

    /// Logical versioned key of the item.
    pub fn key(&self) -> String {
        let mut key = database_rule(&self.database, &self.rule_type);
        if let Some(item_type) = &self.item_type {
            key.push('/');
            key.push_str(item_type);
        }
        if let Some(item_name) = &self.item_name {
            key.push('/');
            key.push_str(item_name);
        }
        key
    }

    pub fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::new(&self.rule_type, self.item_type.as_deref())
    }
}
