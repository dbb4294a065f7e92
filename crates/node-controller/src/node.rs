//! Read-only helpers over `Node` objects.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition};
use kube::ResourceExt;

use crate::config::ReconcilePolicy;

/// Label or taint keys that mark a node as part of the control plane.
pub const CONTROL_PLANE_KEYS: [&str; 3] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/etcd",
];

const NODE_READY: &str = "Ready";

/// Status of a node's Ready condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyStatus {
    True,
    False,
    Unknown,
}

impl ReadyStatus {
    fn from_condition_status(status: &str) -> Self {
        match status {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for ReadyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The node's Ready condition, if it reports one.
#[must_use]
pub fn ready_condition(node: &Node) -> Option<&NodeCondition> {
    node.status
        .as_ref()?
        .conditions
        .as_ref()?
        .iter()
        .find(|condition| condition.type_ == NODE_READY)
}

/// Status of the Ready condition. `None` when the condition is absent,
/// which is not the same as a present condition with status Unknown.
#[must_use]
pub fn ready_status(node: &Node) -> Option<ReadyStatus> {
    ready_condition(node).map(|condition| ReadyStatus::from_condition_status(&condition.status))
}

/// When the Ready condition last changed status.
#[must_use]
pub fn ready_transition_time(node: &Node) -> Option<DateTime<Utc>> {
    ready_condition(node)?
        .last_transition_time
        .as_ref()
        .map(|time| time.0)
}

/// Another actor is already removing the node.
#[must_use]
pub fn is_being_deleted(node: &Node) -> bool {
    node.metadata.deletion_timestamp.is_some()
}

/// The node carries a control-plane label or taint.
#[must_use]
pub fn is_control_plane(node: &Node) -> bool {
    let labels = node.labels();
    if CONTROL_PLANE_KEYS.iter().any(|key| labels.contains_key(*key)) {
        return true;
    }

    node.spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .is_some_and(|taints| {
            taints
                .iter()
                .any(|taint| CONTROL_PLANE_KEYS.contains(&taint.key.as_str()))
        })
}

/// The node carries the delete label with a value the policy accepts.
#[must_use]
pub fn has_delete_label(node: &Node, policy: &ReconcilePolicy) -> bool {
    node.labels()
        .get(&policy.delete_label_key)
        .is_some_and(|value| policy.delete_label_matches(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestNode;

    #[test]
    fn test_ready_status_distinguishes_absent_from_unknown() {
        assert_eq!(ready_status(&TestNode::new("n").build()), None);
        assert_eq!(
            ready_status(&TestNode::new("n").ready_status("Unknown").build()),
            Some(ReadyStatus::Unknown)
        );
        assert_eq!(
            ready_status(&TestNode::new("n").ready_status("False").build()),
            Some(ReadyStatus::False)
        );
        assert_eq!(
            ready_status(&TestNode::new("n").ready_status("True").build()),
            Some(ReadyStatus::True)
        );
    }

    #[test]
    fn test_unrecognized_status_is_unknown() {
        let node = TestNode::new("n").ready_status("Maybe").build();
        assert_eq!(ready_status(&node), Some(ReadyStatus::Unknown));
    }

    #[test]
    fn test_other_conditions_are_ignored() {
        let node = TestNode::new("n").condition("MemoryPressure", "False").build();
        assert_eq!(ready_status(&node), None);
    }

    #[test]
    fn test_control_plane_by_label() {
        for key in CONTROL_PLANE_KEYS {
            let node = TestNode::new("n").label(key, "").build();
            assert!(is_control_plane(&node), "{key}");
        }
    }

    #[test]
    fn test_control_plane_by_taint() {
        let node = TestNode::new("n")
            .taint("node-role.kubernetes.io/control-plane", "NoSchedule")
            .build();
        assert!(is_control_plane(&node));
    }

    #[test]
    fn test_worker_is_not_control_plane() {
        let node = TestNode::new("n")
            .label("node-role.kubernetes.io/worker", "true")
            .taint("example.com/dedicated", "NoSchedule")
            .build();
        assert!(!is_control_plane(&node));
    }

    #[test]
    fn test_delete_label_requires_matching_value() {
        let policy = ReconcilePolicy::default();
        let matching = TestNode::new("n").label("kamatera.io/delete", "true").build();
        let other_value = TestNode::new("n").label("kamatera.io/delete", "false").build();
        let unlabeled = TestNode::new("n").build();

        assert!(has_delete_label(&matching, &policy));
        assert!(!has_delete_label(&other_value, &policy));
        assert!(!has_delete_label(&unlabeled, &policy));
    }

    #[test]
    fn test_delete_label_with_empty_value_matches_presence() {
        let policy = ReconcilePolicy {
            delete_label_value: String::new(),
            ..ReconcilePolicy::default()
        };
        let node = TestNode::new("n").label("kamatera.io/delete", "whatever").build();
        assert!(has_delete_label(&node, &policy));
    }

    #[test]
    fn test_deletion_marker() {
        let node = TestNode::new("n").being_deleted().build();
        assert!(is_being_deleted(&node));
        assert!(!is_being_deleted(&TestNode::new("n").build()));
    }
}
