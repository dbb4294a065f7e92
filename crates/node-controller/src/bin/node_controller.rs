//! Kamatera node controller binary.
//!
//! Parses flags, wires the Kamatera client and Kubernetes client into the
//! reconciler, and runs the controller next to the health probe and
//! metrics servers until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use kamatera::{KamateraClient, ProviderConfig, RetryPolicy};
use node_controller::config::{DEFAULT_DELETE_LABEL_KEY, DEFAULT_DELETE_LABEL_VALUE};
use node_controller::controller::{run_node_controller, Context};
use node_controller::{health, metrics, ControllerMetrics, KubeNodes, NodeReconciler, ReconcilePolicy};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kamatera-node-controller")]
#[command(about = "Deletes Kubernetes nodes whose Kamatera servers are gone")]
#[command(version)]
struct Cli {
    /// Label key that marks a node for deletion
    #[arg(long, env = "DELETE_LABEL_KEY", default_value = DEFAULT_DELETE_LABEL_KEY)]
    delete_label_key: String,

    /// Label value that marks a node for deletion (empty matches any value)
    #[arg(long, env = "DELETE_LABEL_VALUE", default_value = DEFAULT_DELETE_LABEL_VALUE)]
    delete_label_value: String,

    /// Allow deleting control-plane nodes
    #[arg(long, env = "ALLOW_CONTROL_PLANE")]
    allow_control_plane: bool,

    /// Seconds a node must be NotReady before it is considered for deletion
    #[arg(long, env = "NOT_READY_DURATION_SECS", default_value_t = 900)]
    not_ready_duration_secs: u64,

    /// Seconds to wait before re-checking a NotReady node whose server is running
    #[arg(long, env = "SERVER_RUNNING_RECHECK_INTERVAL_SECS", default_value_t = 300)]
    server_running_recheck_interval_secs: u64,

    /// Seconds to wait before retrying a failed reconciliation
    #[arg(long, env = "ERROR_REQUEUE_SECS", default_value_t = 60)]
    error_requeue_secs: u64,

    /// Maximum number of nodes reconciled in parallel
    #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
    concurrency: u16,

    /// Address the health probe server binds to
    #[arg(long, env = "HEALTH_PROBE_BIND_ADDRESS", default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// Address the metrics endpoint binds to
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    metrics_bind_address: SocketAddr,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Attempts per Kamatera API call (at least 1)
    #[arg(long, env = "PROVIDER_MAX_RETRIES", default_value_t = 5)]
    provider_max_retries: u32,

    /// Base delay in seconds for exponential backoff between attempts
    #[arg(long, env = "PROVIDER_RETRY_BASE_DELAY_SECS", default_value_t = 1)]
    provider_retry_base_delay_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Cli {
    fn policy(&self) -> ReconcilePolicy {
        ReconcilePolicy {
            delete_label_key: self.delete_label_key.clone(),
            delete_label_value: self.delete_label_value.clone(),
            not_ready_duration: Duration::from_secs(self.not_ready_duration_secs),
            server_running_recheck_interval: Duration::from_secs(
                self.server_running_recheck_interval_secs,
            ),
            allow_control_plane: self.allow_control_plane,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!(
        "Starting Kamatera node controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let policy = cli
        .policy()
        .validated()
        .context("Invalid reconciliation policy")?;
    let retry = RetryPolicy::new(
        cli.provider_max_retries,
        Duration::from_secs(cli.provider_retry_base_delay_secs),
    )
    .context("Invalid provider retry policy")?;
    // Endpoint and credentials come from KAMATERA_API_URL, _CLIENT_ID and _SECRET.
    let provider_config = ProviderConfig::from_env();
    info!(
        api_url = %provider_config.api_url,
        max_retries = retry.max_retries,
        worst_case_backoff = ?retry.total_backoff(),
        "Kamatera client configured"
    );
    let provider = KamateraClient::new(provider_config, retry)
        .context("Failed to create Kamatera client")?;

    info!(
        delete_label_key = %policy.delete_label_key,
        delete_label_value = %policy.delete_label_value,
        not_ready_duration = ?policy.not_ready_duration,
        server_running_recheck_interval = ?policy.server_running_recheck_interval,
        allow_control_plane = policy.allow_control_plane,
        "Reconciliation policy loaded"
    );

    let client = kube::Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    let shutdown = CancellationToken::new();
    let context = Arc::new(Context {
        reconciler: NodeReconciler::new(KubeNodes::new(client.clone()), provider, Arc::new(policy)),
        shutdown: shutdown.clone(),
        error_requeue: Duration::from_secs(cli.error_requeue_secs),
        metrics: Arc::new(ControllerMetrics::default()),
    });

    let health_handle = tokio::spawn(health::serve(
        cli.health_probe_bind_address,
        shutdown.clone(),
    ));
    let metrics_handle = tokio::spawn(metrics::serve(
        cli.metrics_bind_address,
        context.metrics.clone(),
        shutdown.clone(),
    ));

    // Interrupt in-flight provider calls as soon as a signal arrives.
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    run_node_controller(client, context, cli.concurrency).await?;

    shutdown.cancel();
    match health_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Health probe server error: {}", e),
        Err(e) => error!("Health probe server task failed: {}", e),
    }
    match metrics_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Metrics server error: {}", e),
        Err(e) => error!("Metrics server task failed: {}", e),
    }

    info!("Kamatera node controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(["kamatera-node-controller"]).unwrap();
        let policy = cli.policy();
        assert_eq!(policy, ReconcilePolicy::default());
        assert_eq!(cli.error_requeue_secs, 60);
        assert_eq!(cli.concurrency, 4);
        assert_eq!(cli.provider_max_retries, 5);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert_eq!(cli.health_probe_bind_address.port(), 8081);
        assert_eq!(cli.metrics_bind_address.port(), 8080);
    }

    #[test]
    fn test_flags_override_policy() {
        let cli = Cli::try_parse_from([
            "kamatera-node-controller",
            "--delete-label-key",
            "example.com/remove",
            "--delete-label-value",
            "",
            "--allow-control-plane",
            "--not-ready-duration-secs",
            "120",
            "--log-format",
            "json",
        ])
        .unwrap();
        let policy = cli.policy();
        assert_eq!(policy.delete_label_key, "example.com/remove");
        assert_eq!(policy.delete_label_value, "");
        assert!(policy.allow_control_plane);
        assert_eq!(policy.not_ready_duration, Duration::from_secs(120));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn test_zero_retries_is_rejected() {
        let cli = Cli::try_parse_from([
            "kamatera-node-controller",
            "--provider-max-retries",
            "0",
        ])
        .unwrap();
        assert!(RetryPolicy::new(
            cli.provider_max_retries,
            Duration::from_secs(cli.provider_retry_base_delay_secs)
        )
        .is_err());
    }
}
