//! Kamatera node controller.
//!
//! Watches Kubernetes nodes in an RKE2 cluster running on Kamatera and
//! deletes Node objects that are no longer backed by a running server,
//! or that an operator has labeled for removal.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod controller;
pub mod decision;
pub mod error;
pub mod filter;
pub mod health;
pub mod metrics;
pub mod node;
pub mod reconciler;

#[cfg(test)]
mod fixtures;

pub use config::ReconcilePolicy;
pub use controller::{run_node_controller, Context};
pub use decision::{decide, Decision, SkipReason, Trigger};
pub use error::{Error, Result};
pub use filter::{admit, EventClassifier, NodeEvent};
pub use metrics::ControllerMetrics;
pub use reconciler::{KubeNodes, NodeApi, NodeReconciler, Outcome};
