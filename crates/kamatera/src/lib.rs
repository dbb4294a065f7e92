//! Kamatera cloud API client.
//!
//! Used by the node controller to confirm that the server backing a
//! Kubernetes node has actually stopped before the node is removed.
//!
//! # Example
//!
//! ```rust,ignore
//! use kamatera::{KamateraClient, ProviderConfig, RetryPolicy, ServerStatusProvider};
//! use tokio_util::sync::CancellationToken;
//!
//! let client = KamateraClient::new(ProviderConfig::from_env(), RetryPolicy::default())?;
//! let running = client
//!     .is_server_running("worker-1", &CancellationToken::new())
//!     .await?;
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;

pub use client::{ApiResponse, KamateraClient};
pub use config::{ProviderConfig, RetryPolicy, DEFAULT_API_URL};
pub use error::ProviderError;
pub use server::{ServerStatusProvider, NO_SERVERS_FOUND};
