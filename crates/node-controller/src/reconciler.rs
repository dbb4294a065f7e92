//! Single-node reconciliation.
//!
//! Reads the node, runs [`decide`], verifies the backing server when the
//! trigger requires it, and issues at most one delete per pass. Nothing is
//! retried here; repeated evaluation comes from the caller requeueing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Node;
use kamatera::{ProviderError, ServerStatusProvider};
use kube::api::{DeleteParams, Preconditions};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::config::ReconcilePolicy;
use crate::decision::{decide, Decision, SkipReason, Trigger};
use crate::error::{Error, Result};

/// Result of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Someone else removed the node first.
    AlreadyGone,
}

/// Node reads and deletes against the cluster.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Current node object, or `None` if it no longer exists.
    async fn get(&self, name: &str) -> Result<Option<Node>, kube::Error>;

    /// Delete the node. Not-found is reported as [`DeleteOutcome::AlreadyGone`].
    async fn delete(&self, node: &Node) -> Result<DeleteOutcome, kube::Error>;
}

/// [`NodeApi`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeNodes {
    api: Api<Node>,
}

impl KubeNodes {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl NodeApi for KubeNodes {
    async fn get(&self, name: &str) -> Result<Option<Node>, kube::Error> {
        self.api.get_opt(name).await
    }

    async fn delete(&self, node: &Node) -> Result<DeleteOutcome, kube::Error> {
        // Pin the UID so a re-created node with the same name survives.
        let params = DeleteParams {
            preconditions: node.uid().map(|uid| Preconditions {
                uid: Some(uid),
                resource_version: None,
            }),
            ..DeleteParams::default()
        };

        match self.api.delete(&node.name_any(), &params).await {
            Ok(_) => Ok(DeleteOutcome::Deleted),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Ok(DeleteOutcome::AlreadyGone)
            }
            Err(e) => Err(e),
        }
    }
}

/// What a reconciliation pass ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do until the node changes.
    NoOp,
    /// Evaluate the node again after this delay.
    Requeue(Duration),
    /// The node was deleted.
    Deleted(Trigger),
}

/// Deletes nodes that are marked for removal or whose servers have stopped.
pub struct NodeReconciler<N, S> {
    nodes: N,
    servers: S,
    policy: Arc<ReconcilePolicy>,
}

impl<N, S> NodeReconciler<N, S>
where
    N: NodeApi,
    S: ServerStatusProvider,
{
    pub fn new(nodes: N, servers: S, policy: Arc<ReconcilePolicy>) -> Self {
        Self {
            nodes,
            servers,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &ReconcilePolicy {
        &self.policy
    }

    /// Reconcile the node called `name` as of now.
    ///
    /// # Errors
    /// Kubernetes or provider failures, or [`Error::Cancelled`].
    pub async fn reconcile(&self, name: &str, cancel: &CancellationToken) -> Result<Outcome> {
        self.reconcile_at(name, Utc::now(), cancel).await
    }

    /// Reconcile the node called `name` as of `now`.
    ///
    /// # Errors
    /// Kubernetes or provider failures, or [`Error::Cancelled`]. A node
    /// that disappears at any point is not an error.
    #[instrument(skip_all, fields(node = %name))]
    pub async fn reconcile_at(
        &self,
        name: &str,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let Some(node) = self.nodes.get(name).await? else {
            debug!("node no longer exists");
            return Ok(Outcome::NoOp);
        };

        let trigger = match decide(&node, &self.policy, now) {
            Decision::Skip(SkipReason::ControlPlane) => {
                info!("skipping deletion of control-plane node");
                return Ok(Outcome::NoOp);
            }
            Decision::Skip(reason) => {
                debug!(%reason, "nothing to do");
                return Ok(Outcome::NoOp);
            }
            Decision::Requeue(requeue_after) => {
                debug!(?requeue_after, "node not ready yet");
                return Ok(Outcome::Requeue(requeue_after));
            }
            Decision::Delete(trigger) => trigger,
        };

        if trigger.requires_server_check() {
            let running = self
                .servers
                .is_server_running(name, cancel)
                .await
                .map_err(|e| match e {
                    ProviderError::Cancelled => Error::Cancelled,
                    other => Error::Provider(other),
                })?;

            if running {
                let requeue_after = self.policy.server_running_recheck_interval;
                debug!(
                    ?requeue_after,
                    "node is NotReady but Kamatera server is still running"
                );
                return Ok(Outcome::Requeue(requeue_after));
            }
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        match self.nodes.delete(&node).await? {
            DeleteOutcome::AlreadyGone => {
                debug!("node was removed concurrently");
                Ok(Outcome::NoOp)
            }
            DeleteOutcome::Deleted => {
                info!(
                    reason = %trigger,
                    not_ready_for = ?trigger.not_ready_for(),
                    "deleted node"
                );
                Ok(Outcome::Deleted(trigger))
            }
        }
    }
}
