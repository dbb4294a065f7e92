//! Event admission.
//!
//! Decides which node watch events are worth a reconciliation. Unrelated
//! churn (heartbeats, other labels, annotations) is dropped before it
//! reaches the work queue.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::Node;
use kube::runtime::watcher;
use kube::ResourceExt;
use tracing::trace;

use crate::config::ReconcilePolicy;
use crate::node::{has_delete_label, is_being_deleted, ready_status, ReadyStatus};

/// A watch event with the snapshots it carries.
#[derive(Debug, Clone, Copy)]
pub enum NodeEvent<'a> {
    Create(&'a Node),
    Update { old: &'a Node, new: &'a Node },
    Delete(&'a Node),
    Generic(&'a Node),
}

/// Whether `event` should enqueue a reconciliation.
#[must_use]
pub fn admit(event: &NodeEvent<'_>, policy: &ReconcilePolicy) -> bool {
    match event {
        NodeEvent::Create(node) | NodeEvent::Generic(node) => is_candidate(node, policy),
        NodeEvent::Update { old, new } => {
            TriggerState::of(old, policy) != TriggerState::of(new, policy)
        }
        NodeEvent::Delete(_) => false,
    }
}

/// A node that could currently lead to a deletion.
fn is_candidate(node: &Node, policy: &ReconcilePolicy) -> bool {
    !is_being_deleted(node)
        && (has_delete_label(node, policy)
            || matches!(
                ready_status(node),
                Some(ReadyStatus::False | ReadyStatus::Unknown)
            ))
}

/// The parts of a node that updates are compared on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TriggerState {
    ready: Option<ReadyStatus>,
    delete_label: bool,
}

impl TriggerState {
    fn of(node: &Node, policy: &ReconcilePolicy) -> Self {
        Self {
            ready: ready_status(node),
            delete_label: has_delete_label(node, policy),
        }
    }
}

/// Turns raw watcher events into [`NodeEvent`]s and applies [`admit`].
///
/// Remembers the last seen snapshot of every node so an update can be
/// judged against the previous one. Objects replayed by a re-list that
/// were already known are reported as generic events.
#[derive(Debug)]
pub struct EventClassifier {
    policy: ReconcilePolicy,
    seen: HashMap<String, Node>,
    relist: Option<HashMap<String, Node>>,
}

impl EventClassifier {
    #[must_use]
    pub fn new(policy: ReconcilePolicy) -> Self {
        Self {
            policy,
            seen: HashMap::new(),
            relist: None,
        }
    }

    /// Feed one watcher event. Returns the node to reconcile, if admitted.
    pub fn classify(&mut self, event: watcher::Event<Node>) -> Option<Node> {
        match event {
            watcher::Event::Apply(node) => {
                let name = node.name_any();
                let event = match self.seen.get(&name) {
                    Some(old) => NodeEvent::Update { old, new: &node },
                    None => NodeEvent::Create(&node),
                };
                let admitted = admit(&event, &self.policy);
                self.seen.insert(name.clone(), node.clone());
                self.emit(name, admitted, node)
            }
            watcher::Event::InitApply(node) => {
                let name = node.name_any();
                let event = if self.seen.contains_key(&name) {
                    NodeEvent::Generic(&node)
                } else {
                    NodeEvent::Create(&node)
                };
                let admitted = admit(&event, &self.policy);
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(name.clone(), node.clone());
                self.emit(name, admitted, node)
            }
            watcher::Event::Delete(node) => {
                let admitted = admit(&NodeEvent::Delete(&node), &self.policy);
                let name = node.name_any();
                self.seen.remove(&name);
                if let Some(relist) = self.relist.as_mut() {
                    relist.remove(&name);
                }
                self.emit(name, admitted, node)
            }
            watcher::Event::Init => {
                self.relist = Some(HashMap::new());
                None
            }
            watcher::Event::InitDone => {
                // Nodes missing from the re-list are gone.
                if let Some(relist) = self.relist.take() {
                    self.seen = relist;
                }
                None
            }
        }
    }

    /// Number of nodes currently tracked.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.seen.len()
    }

    fn emit(&self, name: String, admitted: bool, node: Node) -> Option<Node> {
        trace!(node = %name, admitted, "node event");
        admitted.then_some(node)
    }
}
