use std::sync::LazyLock;

use regex::Regex;
use shardmesh_core::{ChangeType, DataChangedEvent};
use shardmesh_persist::node_path::COMPUTE_NODES_ROOT;

use super::DispatchBuilder;
use crate::event::DispatchEvent;

static TRIGGER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/nodes/compute_nodes/(show_process_list_trigger|kill_process_trigger)/([^/:]+):([^/]+)$")
        .expect("Invalid process trigger regex")
});

/// Process list and kill triggers addressed to one instance.
///
/// Trigger nodes are named `{instanceId}:{taskId}`. Creating a show trigger
/// requests the process list; deleting it marks the request as served.
pub struct ProcessListBuilder;

impl DispatchBuilder for ProcessListBuilder {
    fn name(&self) -> &str {
        "process_list"
    }

    fn subscribed_keys(&self) -> Vec<String> {
        vec![
            format!("{COMPUTE_NODES_ROOT}/show_process_list_trigger/"),
            format!("{COMPUTE_NODES_ROOT}/kill_process_trigger/"),
        ]
    }

    fn subscribed_types(&self) -> &'static [ChangeType] {
        &[ChangeType::Added, ChangeType::Deleted]
    }

    fn build(&self, event: &DataChangedEvent) -> Option<DispatchEvent> {
        let caps = TRIGGER_REGEX.captures(&event.key)?;
        let instance_id = caps.get(2)?.as_str().to_string();
        let id = caps.get(3)?.as_str().to_string();
        match (caps.get(1)?.as_str(), event.event_type) {
            ("show_process_list_trigger", ChangeType::Added) => {
                Some(DispatchEvent::ShowProcessListRequested {
                    instance_id,
                    task_id: id,
                })
            }
            ("show_process_list_trigger", ChangeType::Deleted) => {
                Some(DispatchEvent::ShowProcessListCompleted {
                    instance_id,
                    task_id: id,
                })
            }
            ("kill_process_trigger", ChangeType::Added) => Some(DispatchEvent::KillProcessRequested {
                instance_id,
                process_id: id,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_show_process_list_lifecycle() {
        let key = "/nodes/compute_nodes/show_process_list_trigger/node-1:task-9";
        assert_eq!(
            ProcessListBuilder.build(&DataChangedEvent::added(key, "")),
            Some(DispatchEvent::ShowProcessListRequested {
                instance_id: "node-1".into(),
                task_id: "task-9".into(),
            })
        );
        assert_eq!(
            ProcessListBuilder.build(&DataChangedEvent::deleted(key)),
            Some(DispatchEvent::ShowProcessListCompleted {
                instance_id: "node-1".into(),
                task_id: "task-9".into(),
            })
        );
    }

    #[test]
    fn test_kill_process() {
        let key = "/nodes/compute_nodes/kill_process_trigger/node-1:42";
        assert_eq!(
            ProcessListBuilder.build(&DataChangedEvent::added(key, "")),
            Some(DispatchEvent::KillProcessRequested {
                instance_id: "node-1".into(),
                process_id: "42".into(),
            })
        );
        assert_eq!(ProcessListBuilder.build(&DataChangedEvent::deleted(key)), None);
    }

    #[test]
    fn test_trigger_without_task_is_ignored() {
        let event = DataChangedEvent::added("/nodes/compute_nodes/kill_process_trigger/node-1", "");
        assert_eq!(ProcessListBuilder.build(&event), None);
    }
}
