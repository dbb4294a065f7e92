//! Kamatera API client implementation.
//!
//! Every call goes through [`KamateraClient::request`], which retries
//! transient failures with exponential backoff and can treat one specific
//! HTTP 500 error message as a definitive negative answer.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{ProviderConfig, RetryPolicy};
use crate::error::ProviderError;

/// Per-call timeout for the underlying HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// User agent sent with every request.
pub const USER_AGENT: &str = "kamatera/kamatera-rke2-controller";

/// Queue polling is high frequency, so it only logs at trace level.
const QUEUE_PATH_PREFIX: &str = "service/queue";

/// Result of a successful [`KamateraClient::request`].
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// The API answered 500 with the caller's ignore message.
    pub ignored: bool,
    /// Decoded JSON body.
    pub payload: Value,
}

/// Kamatera cloud API client.
#[derive(Clone)]
pub struct KamateraClient {
    /// HTTP client, shared by every request made through this instance.
    client: Client,
    /// Endpoint and credentials.
    config: ProviderConfig,
    /// Attempt budget and backoff.
    retry: RetryPolicy,
}

impl KamateraClient {
    /// Create a new Kamatera client.
    ///
    /// # Errors
    /// Returns error if the retry policy is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: ProviderConfig, retry: RetryPolicy) -> Result<Self, ProviderError> {
        retry.validate()?;

        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            config,
            retry,
        })
    }

    /// Make an authenticated request, retrying transient failures.
    ///
    /// When the API answers HTTP 500 with a `message` containing
    /// `ignore_error_message` (if non-empty), the call returns immediately
    /// with `ignored` set instead of failing.
    ///
    /// # Errors
    /// - [`ProviderError::MalformedRequest`] if `body` cannot be serialized.
    /// - [`ProviderError::Cancelled`] as soon as `cancel` fires.
    /// - The last attempt's error once every attempt has failed.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        ignore_error_message: &str,
        cancel: &CancellationToken,
    ) -> Result<ApiResponse, ProviderError>
    where
        B: Serialize + ?Sized,
    {
        let body = match body {
            Some(body) => serde_json::to_vec(body).map_err(ProviderError::MalformedRequest)?,
            None => Vec::new(),
        };

        let path = path.trim_start_matches('/');
        let quiet = path.starts_with(QUEUE_PATH_PREFIX);
        let url = self.config.url_for(path);

        let mut last_error = None;
        for attempt in 0..self.retry.max_retries {
            if quiet {
                trace!(%method, url = %url, attempt, "kamatera request");
            } else {
                debug!(
                    %method,
                    url = %url,
                    attempt,
                    body = %String::from_utf8_lossy(&body),
                    "kamatera request"
                );
            }

            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                if !quiet {
                    debug!(attempt, delay = ?delay, "kamatera request retry");
                }
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                    () = tokio::time::sleep(delay) => {}
                }
            }

            if cancel.is_cancelled() {
                return Err(ProviderError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                outcome = self.send_once(method.clone(), &url, &body, ignore_error_message) => outcome,
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        error = %e,
                        "kamatera request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ProviderError::Config("max_retries must be at least 1".to_string())
        }))
    }

    /// Perform a single attempt and classify its response.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: &[u8],
        ignore_error_message: &str,
    ) -> Result<ApiResponse, ProviderError> {
        let response = self
            .client
            .request(method, url)
            .header("AuthClientId", &self.config.client_id)
            .header("AuthSecret", &self.config.secret)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;

        let payload: Value = match serde_json::from_slice(&bytes) {
            Ok(payload) => payload,
            Err(_) if status != StatusCode::OK => {
                return Err(ProviderError::BadStatus {
                    status: status.as_u16(),
                })
            }
            Err(source) => return Err(ProviderError::BadPayload { source }),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR
            && message_contains(&payload, ignore_error_message)
        {
            debug!(url = %url, "kamatera error response matched ignore message");
            return Ok(ApiResponse {
                ignored: true,
                payload,
            });
        }

        if status != StatusCode::OK {
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: payload.to_string(),
            });
        }

        Ok(ApiResponse {
            ignored: false,
            payload,
        })
    }
}

/// Whether the payload's `message` field contains `needle`.
///
/// An empty needle never matches.
fn message_contains(payload: &Value, needle: &str) -> bool {
    !needle.is_empty()
        && payload
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|message| message.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_contains_matches_substring() {
        let payload = json!({"message": "Error: No servers found for filter"});
        assert!(message_contains(&payload, "No servers found"));
    }

    #[test]
    fn test_message_contains_ignores_empty_needle() {
        let payload = json!({"message": "No servers found"});
        assert!(!message_contains(&payload, ""));
    }

    #[test]
    fn test_message_contains_requires_string_message() {
        assert!(!message_contains(&json!({"message": 42}), "42"));
        assert!(!message_contains(&json!(["No servers found"]), "No servers found"));
        assert!(!message_contains(&json!({}), "No servers found"));
    }

    #[test]
    fn test_client_timeout_is_five_minutes() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(300));
    }

    #[test]
    fn test_new_rejects_zero_retries() {
        let config = ProviderConfig::new("http://localhost", "id", "secret");
        let retry = RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_secs(1),
        };
        assert!(matches!(
            KamateraClient::new(config, retry),
            Err(ProviderError::Config(_))
        ));
    }
}
