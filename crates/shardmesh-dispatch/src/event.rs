//! Typed domain events produced by dispatch builders.

use shardmesh_core::{ClusterState, InstanceAttributes, InstanceState, InstanceType, RuleChangedItemType};

/// A database rule item became active at a new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlterRuleItemEvent {
    pub database: String,
    pub rule_type: String,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
    /// Logical key whose active version changed.
    pub active_version_key: String,
    pub active_version: u64,
}

impl AlterRuleItemEvent {
    pub fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::new(&self.rule_type, self.item_type.as_deref())
    }
}

/// A database rule item was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRuleItemEvent {
    pub database: String,
    pub rule_type: String,
    pub item_type: Option<String>,
    pub item_name: Option<String>,
}

impl DropRuleItemEvent {
    pub fn changed_item_type(&self) -> RuleChangedItemType {
        RuleChangedItemType::new(&self.rule_type, self.item_type.as_deref())
    }
}

/// Every event a dispatch builder may emit.
///
/// Events carry identity and the new value only, never a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    InstanceOnline {
        instance_id: String,
        instance_type: InstanceType,
        attributes: InstanceAttributes,
    },
    InstanceOffline {
        instance_id: String,
        instance_type: InstanceType,
    },
    WorkerIdChanged {
        instance_id: String,
        worker_id: Option<u32>,
    },
    LabelsChanged {
        instance_id: String,
        labels: Vec<String>,
    },
    ComputeNodeStateChanged {
        instance_id: String,
        state: InstanceState,
    },
    ClusterStateChanged {
        state: ClusterState,
    },
    AlterRuleItem(AlterRuleItemEvent),
    DropRuleItem(DropRuleItemEvent),
    GlobalRuleAltered {
        rule_type: String,
        active_version: u64,
    },
    PropertiesAltered {
        active_version: u64,
    },
    StorageUnitRegistered {
        database: String,
        name: String,
        active_version: u64,
    },
    StorageUnitAltered {
        database: String,
        name: String,
        active_version: u64,
    },
    StorageUnitUnregistered {
        database: String,
        name: String,
    },
    DatabaseCreated {
        database: String,
    },
    DatabaseDropped {
        database: String,
    },
    ShowProcessListRequested {
        instance_id: String,
        task_id: String,
    },
    ShowProcessListCompleted {
        instance_id: String,
        task_id: String,
    },
    KillProcessRequested {
        instance_id: String,
        process_id: String,
    },
}

impl DispatchEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InstanceOnline { .. } => "instance_online",
            Self::InstanceOffline { .. } => "instance_offline",
            Self::WorkerIdChanged { .. } => "worker_id_changed",
            Self::LabelsChanged { .. } => "labels_changed",
            Self::ComputeNodeStateChanged { .. } => "compute_node_state_changed",
            Self::ClusterStateChanged { .. } => "cluster_state_changed",
            Self::AlterRuleItem(_) => "alter_rule_item",
            Self::DropRuleItem(_) => "drop_rule_item",
            Self::GlobalRuleAltered { .. } => "global_rule_altered",
            Self::PropertiesAltered { .. } => "properties_altered",
            Self::StorageUnitRegistered { .. } => "storage_unit_registered",
            Self::StorageUnitAltered { .. } => "storage_unit_altered",
            Self::StorageUnitUnregistered { .. } => "storage_unit_unregistered",
            Self::DatabaseCreated { .. } => "database_created",
            Self::DatabaseDropped { .. } => "database_dropped",
            Self::ShowProcessListRequested { .. } => "show_process_list_requested",
            Self::ShowProcessListCompleted { .. } => "show_process_list_completed",
            Self::KillProcessRequested { .. } => "kill_process_requested",
        }
    }
}
