//! Per-node deletion decision.
//!
//! [`decide`] is pure: it looks only at the node snapshot, the policy and
//! the current time. Server verification and the delete call are carried
//! out by the reconciler based on the returned [`Decision`].

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;

use crate::config::ReconcilePolicy;
use crate::node::{
    has_delete_label, is_being_deleted, is_control_plane, ready_status, ready_transition_time,
    ReadyStatus,
};

/// Why a node is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The node already has a deletion timestamp.
    BeingDeleted,
    /// Control-plane node and the policy does not allow deleting it.
    ControlPlane,
    /// The node reports no Ready condition.
    NoReadyCondition,
    /// The node is Ready.
    Ready,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeingDeleted => write!(f, "being-deleted"),
            Self::ControlPlane => write!(f, "control-plane"),
            Self::NoReadyCondition => write!(f, "no-ready-condition"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// What led to a delete decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The node carries the delete label.
    DeleteLabel,
    /// The node has been NotReady or Unknown for at least the policy's duration.
    NotReadyTimeout { not_ready_for: Duration },
}

impl Trigger {
    /// Whether the backing server must be confirmed stopped first.
    ///
    /// An explicit delete label is operator intent and skips the check.
    #[must_use]
    pub fn requires_server_check(&self) -> bool {
        matches!(self, Self::NotReadyTimeout { .. })
    }

    /// Elapsed NotReady time for readiness triggers.
    #[must_use]
    pub fn not_ready_for(&self) -> Option<Duration> {
        match self {
            Self::DeleteLabel => None,
            Self::NotReadyTimeout { not_ready_for } => Some(*not_ready_for),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeleteLabel => write!(f, "delete-label"),
            Self::NotReadyTimeout { .. } => write!(f, "not-ready-timeout"),
        }
    }
}

/// Outcome of evaluating a node snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do.
    Skip(SkipReason),
    /// Not NotReady for long enough yet; look again after this delay.
    Requeue(Duration),
    /// Delete the node, after server verification if the trigger needs it.
    Delete(Trigger),
}

/// Decide what to do with `node` at time `now`.
///
/// Checks run in a fixed order: deletion marker, control-plane guard,
/// delete label, then readiness timeout. The control-plane guard sits in
/// front of every trigger, so no trigger can reach [`Decision::Delete`]
/// for a protected node.
#[must_use]
pub fn decide(node: &Node, policy: &ReconcilePolicy, now: DateTime<Utc>) -> Decision {
    if is_being_deleted(node) {
        return Decision::Skip(SkipReason::BeingDeleted);
    }

    if !policy.allow_control_plane && is_control_plane(node) {
        return Decision::Skip(SkipReason::ControlPlane);
    }

    if has_delete_label(node, policy) {
        return Decision::Delete(Trigger::DeleteLabel);
    }

    match ready_status(node) {
        None => Decision::Skip(SkipReason::NoReadyCondition),
        Some(ReadyStatus::True) => Decision::Skip(SkipReason::Ready),
        Some(ReadyStatus::False | ReadyStatus::Unknown) => {
            // A missing transition time counts as "just became NotReady".
            let since = ready_transition_time(node).unwrap_or(now);
            let not_ready_for = elapsed(since, now);

            if not_ready_for < policy.not_ready_duration {
                Decision::Requeue(policy.not_ready_duration - not_ready_for)
            } else {
                Decision::Delete(Trigger::NotReadyTimeout { not_ready_for })
            }
        }
    }
}

/// Time between `since` and `now`, clamped at zero for clock skew.
fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}
