//! Kubernetes runtime wiring for the node reconciler.
//!
//! A watcher over all nodes feeds a reflector store. Each watch event is
//! classified and passed through the admission filter; admitted nodes are
//! handed to the kube-rs controller, which serializes work per node,
//! schedules requeues and bounds concurrency.

use std::sync::Arc;
use std::time::Duration;

use futures::{future, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kamatera::KamateraClient;
use kube::runtime::controller::{self, Action, Controller};
use kube::runtime::{reflector, watcher, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Error, Result};
use crate::filter::EventClassifier;
use crate::metrics::ControllerMetrics;
use crate::reconciler::{KubeNodes, NodeReconciler, Outcome};

/// Default delay before retrying a failed reconciliation.
pub const DEFAULT_ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Shared state handed to every reconciliation.
pub struct Context {
    pub reconciler: NodeReconciler<KubeNodes, KamateraClient>,
    /// Cancelled on shutdown; every pass gets a child token.
    pub shutdown: CancellationToken,
    /// Delay before a failed pass is retried.
    pub error_requeue: Duration,
    pub metrics: Arc<ControllerMetrics>,
}

/// Map a pass outcome to the controller's scheduling action.
#[must_use]
pub fn action_for(outcome: Outcome) -> Action {
    match outcome {
        Outcome::NoOp | Outcome::Deleted(_) => Action::await_change(),
        Outcome::Requeue(after) => Action::requeue(after),
    }
}

/// Run the node controller until shutdown.
///
/// # Errors
/// Currently always returns `Ok`; watch and reconcile failures are logged
/// and retried by the runtime.
#[instrument(skip_all, fields(concurrency = concurrency))]
pub async fn run_node_controller(
    client: Client,
    context: Arc<Context>,
    concurrency: u16,
) -> Result<()> {
    info!("Starting node controller");

    let nodes: Api<Node> = Api::all(client);
    let (reader, writer) = reflector::store();
    let mut classifier = EventClassifier::new(context.reconciler.policy().clone());

    let admitted = watcher(nodes, watcher::Config::default().any_semantic())
        .default_backoff()
        .reflect(writer)
        .filter_map(move |event| {
            let admitted = match event {
                Ok(event) => classifier.classify(event).map(Ok),
                Err(e) => Some(Err(e)),
            };
            future::ready(admitted)
        });

    Controller::for_stream(admitted, reader)
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok((node, action)) => {
                    debug!(node = %node.name, ?action, "node reconciliation finished");
                }
                Err(e) => {
                    warn!(error = %e, "node controller error");
                }
            }
        })
        .await;

    info!("Node controller shutting down");
    Ok(())
}

async fn reconcile(node: Arc<Node>, ctx: Arc<Context>) -> Result<Action> {
    let cancel = ctx.shutdown.child_token();
    let result = ctx.reconciler.reconcile(&node.name_any(), &cancel).await;
    match &result {
        Ok(outcome) => ctx.metrics.record_outcome(outcome),
        Err(_) => ctx.metrics.record_error(),
    }
    Ok(action_for(result?))
}

fn error_policy(node: Arc<Node>, err: &Error, ctx: Arc<Context>) -> Action {
    match err {
        Error::Cancelled => {
            info!(node = %node.name_any(), "node reconciliation cancelled");
        }
        _ => {
            error!(
                node = %node.name_any(),
                error = %err,
                "node reconciliation failed"
            );
        }
    }
    Action::requeue(ctx.error_requeue)
}
