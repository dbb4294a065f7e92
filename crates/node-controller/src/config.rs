//! Reconciliation policy.
//!
//! Built once at startup from the command line and shared read-only by
//! every reconciliation afterwards.

use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Label key that marks a node for deletion unless overridden.
pub const DEFAULT_DELETE_LABEL_KEY: &str = "kamatera.io/delete";

/// Label value that marks a node for deletion unless overridden.
pub const DEFAULT_DELETE_LABEL_VALUE: &str = "true";

/// How long a node must stay NotReady before deletion is considered.
pub const DEFAULT_NOT_READY_DURATION: Duration = Duration::from_secs(15 * 60);

/// How long to wait before re-checking a NotReady node whose server still runs.
pub const DEFAULT_SERVER_RUNNING_RECHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Policy applied to every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePolicy {
    /// Label key that triggers deletion.
    pub delete_label_key: String,
    /// Label value that triggers deletion; empty matches any value.
    pub delete_label_value: String,
    /// Minimum continuous NotReady time before deletion is considered.
    pub not_ready_duration: Duration,
    /// Requeue delay while the backing server is still running.
    pub server_running_recheck_interval: Duration,
    /// Allow deleting control-plane nodes.
    pub allow_control_plane: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            delete_label_key: DEFAULT_DELETE_LABEL_KEY.to_string(),
            delete_label_value: DEFAULT_DELETE_LABEL_VALUE.to_string(),
            not_ready_duration: DEFAULT_NOT_READY_DURATION,
            server_running_recheck_interval: DEFAULT_SERVER_RUNNING_RECHECK_INTERVAL,
            allow_control_plane: false,
        }
    }
}

impl ReconcilePolicy {
    /// Validate the policy and replace zero durations with their defaults.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the delete label key is empty.
    pub fn validated(mut self) -> Result<Self> {
        if self.delete_label_key.trim().is_empty() {
            return Err(Error::Config(
                "--delete-label-key must be non-empty".to_string(),
            ));
        }

        if self.not_ready_duration.is_zero() {
            warn!(
                default = ?DEFAULT_NOT_READY_DURATION,
                "not-ready duration is zero, using default"
            );
            self.not_ready_duration = DEFAULT_NOT_READY_DURATION;
        }

        if self.server_running_recheck_interval.is_zero() {
            warn!(
                default = ?DEFAULT_SERVER_RUNNING_RECHECK_INTERVAL,
                "server running recheck interval is zero, using default"
            );
            self.server_running_recheck_interval = DEFAULT_SERVER_RUNNING_RECHECK_INTERVAL;
        }

        Ok(self)
    }

    /// Whether a label value satisfies the delete label policy.
    #[must_use]
    pub fn delete_label_matches(&self, value: &str) -> bool {
        self.delete_label_value.is_empty() || self.delete_label_value == value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = ReconcilePolicy::default();
        assert_eq!(policy.delete_label_key, "kamatera.io/delete");
        assert_eq!(policy.delete_label_value, "true");
        assert_eq!(policy.not_ready_duration, Duration::from_secs(900));
        assert_eq!(policy.server_running_recheck_interval, Duration::from_secs(300));
        assert!(!policy.allow_control_plane);
    }

    #[test]
    fn test_empty_label_key_is_rejected() {
        let policy = ReconcilePolicy {
            delete_label_key: "  ".to_string(),
            ..ReconcilePolicy::default()
        };
        assert!(matches!(policy.validated(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_durations_fall_back_to_defaults() {
        let policy = ReconcilePolicy {
            not_ready_duration: Duration::ZERO,
            server_running_recheck_interval: Duration::ZERO,
            ..ReconcilePolicy::default()
        }
        .validated()
        .unwrap();
        assert_eq!(policy.not_ready_duration, DEFAULT_NOT_READY_DURATION);
        assert_eq!(
            policy.server_running_recheck_interval,
            DEFAULT_SERVER_RUNNING_RECHECK_INTERVAL
        );
    }

    #[test]
    fn test_delete_label_value_matching() {
        let exact = ReconcilePolicy::default();
        assert!(exact.delete_label_matches("true"));
        assert!(!exact.delete_label_matches("yes"));
        assert!(!exact.delete_label_matches(""));

        let any = ReconcilePolicy {
            delete_label_value: String::new(),
            ..ReconcilePolicy::default()
        };
        assert!(any.delete_label_matches(""));
        assert!(any.delete_label_matches("anything"));
    }
}
