//! Node builders shared by unit tests.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node, NodeCondition, NodeSpec, NodeStatus, Taint};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};

/// Fixed "now" used across tests.
pub(crate) fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub(crate) fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    now() - chrono::Duration::minutes(minutes)
}

pub(crate) struct TestNode {
    node: Node,
}

impl TestNode {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            node: Node {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    uid: Some(format!("uid-{name}")),
                    ..ObjectMeta::default()
                },
                ..Node::default()
            },
        }
    }

    pub(crate) fn label(mut self, key: &str, value: &str) -> Self {
        self.node
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(key.to_string(), value.to_string());
        self
    }

    pub(crate) fn taint(mut self, key: &str, effect: &str) -> Self {
        self.node
            .spec
            .get_or_insert_with(NodeSpec::default)
            .taints
            .get_or_insert_with(Vec::new)
            .push(Taint {
                key: key.to_string(),
                effect: effect.to_string(),
                ..Taint::default()
            });
        self
    }

    pub(crate) fn condition(mut self, type_: &str, status: &str) -> Self {
        self.push_condition(type_, status, None);
        self
    }

    pub(crate) fn ready_status(self, status: &str) -> Self {
        self.condition("Ready", status)
    }

    pub(crate) fn ready_since(mut self, status: &str, since: DateTime<Utc>) -> Self {
        self.push_condition("Ready", status, Some(since));
        self
    }

    pub(crate) fn being_deleted(mut self) -> Self {
        self.node.metadata.deletion_timestamp = Some(Time(now()));
        self
    }

    pub(crate) fn build(self) -> Node {
        self.node
    }

    fn push_condition(&mut self, type_: &str, status: &str, since: Option<DateTime<Utc>>) {
        self.node
            .status
            .get_or_insert_with(NodeStatus::default)
            .conditions
            .get_or_insert_with(Vec::new)
            .push(NodeCondition {
                type_: type_.to_string(),
                status: status.to_string(),
                last_transition_time: since.map(Time),
                ..NodeCondition::default()
            });
    }
}
