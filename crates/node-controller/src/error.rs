//! Error types for the node controller.

use kamatera::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("server state lookup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("reconciliation cancelled")]
    Cancelled,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
