//! Server power-state lookup.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::KamateraClient;
use crate::error::ProviderError;
use crate::models::{ServerInfo, ServerInfoRequest};

/// Path of the server lookup endpoint.
pub const SERVER_INFO_PATH: &str = "/service/server/info";

/// Error message the API returns (with HTTP 500) when no server matches.
pub const NO_SERVERS_FOUND: &str = "No servers found";

/// Answers whether the server backing a node is running.
#[async_trait]
pub trait ServerStatusProvider: Send + Sync {
    /// Returns `true` only if the server named `name` is powered on.
    ///
    /// A server that does not exist is reported as not running. Any
    /// uncertainty is an error, never `false`.
    async fn is_server_running(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ProviderError>;
}

#[async_trait]
impl ServerStatusProvider for KamateraClient {
    async fn is_server_running(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, ProviderError> {
        let response = self
            .request(
                Method::POST,
                SERVER_INFO_PATH,
                Some(&ServerInfoRequest { name }),
                NO_SERVERS_FOUND,
                cancel,
            )
            .await?;

        if response.ignored {
            debug!(server = %name, "no server found");
            return Ok(false);
        }

        parse_power_state(response.payload)
    }
}

/// Interpret a server info response body.
///
/// Zero records means the server is gone. More than one record, or a
/// record without a string `power` field, is an error.
///
/// # Errors
/// [`ProviderError::AmbiguousServerState`] or
/// [`ProviderError::InvalidServerInfoFormat`].
pub fn parse_power_state(payload: Value) -> Result<bool, ProviderError> {
    let mut records = match payload {
        Value::Array(records) => records,
        other => {
            return Err(ProviderError::InvalidServerInfoFormat(format!(
                "expected a list of servers, got {other}"
            )))
        }
    };

    match records.len() {
        0 => Ok(false),
        1 => {
            let info: ServerInfo = serde_json::from_value(records.remove(0))
                .map_err(|e| ProviderError::InvalidServerInfoFormat(e.to_string()))?;
            debug!(
                server = info.name.as_deref().unwrap_or("<unnamed>"),
                power = %info.power,
                "server power state"
            );
            Ok(info.is_powered_on())
        }
        count => Err(ProviderError::AmbiguousServerState(count)),
    }
}
