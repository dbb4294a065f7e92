//! Connection and retry settings for the Kamatera API.

use std::fmt;
use std::time::Duration;

use crate::error::ProviderError;

/// Base URL used when `KAMATERA_API_URL` is not set.
pub const DEFAULT_API_URL: &str = "https://cloudcli.cloudwm.com";

/// Environment variable holding the API base URL.
pub const API_URL_ENV: &str = "KAMATERA_API_URL";

/// Environment variable holding the API client id.
pub const API_CLIENT_ID_ENV: &str = "KAMATERA_API_CLIENT_ID";

/// Environment variable holding the API secret.
pub const API_SECRET_ENV: &str = "KAMATERA_API_SECRET";

/// Credentials and endpoint for the Kamatera API.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API base URL, without the request path.
    pub api_url: String,
    /// Value of the `AuthClientId` header.
    pub client_id: String,
    /// Value of the `AuthSecret` header.
    pub secret: String,
}

impl ProviderConfig {
    /// Create a provider configuration.
    pub fn new(
        api_url: impl Into<String>,
        client_id: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            client_id: client_id.into(),
            secret: secret.into(),
        }
    }

    /// Read the configuration from `KAMATERA_API_*` environment variables.
    ///
    /// An unset or empty URL falls back to [`DEFAULT_API_URL`].
    #[must_use]
    pub fn from_env() -> Self {
        let api_url = std::env::var(API_URL_ENV)
            .ok()
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        Self {
            api_url,
            client_id: std::env::var(API_CLIENT_ID_ENV).unwrap_or_default(),
            secret: std::env::var(API_SECRET_ENV).unwrap_or_default(),
        }
    }

    /// Join the base URL and a request path with a single slash.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

// Keep the secret out of logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("client_id", &self.client_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Bounded retry with exponential backoff, no jitter and no cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_retries: u32,
    /// Unit of the backoff; retry `n` waits `base_delay << n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create a retry policy.
    ///
    /// # Errors
    /// Returns [`ProviderError::Config`] if `max_retries` is zero.
    pub fn new(max_retries: u32, base_delay: Duration) -> Result<Self, ProviderError> {
        let policy = Self {
            max_retries,
            base_delay,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check that at least one attempt will be made.
    ///
    /// # Errors
    /// Returns [`ProviderError::Config`] if `max_retries` is zero.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.max_retries == 0 {
            return Err(ProviderError::Config(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay to wait before attempt number `attempt` (zero-based).
    ///
    /// The first attempt never waits; attempt `n` waits `base_delay << n`.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Sum of every delay a fully failing request sleeps through.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (0..self.max_retries)
            .map(|attempt| self.delay_before(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_delay_doubles_per_retry() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (0..6).map(|a| policy.delay_before(a).as_secs()).collect();
        assert_eq!(delays, vec![0, 2, 4, 8, 16, 32]);
    }

    #[test]
    fn test_default_policy_waits_thirty_seconds_when_every_attempt_fails() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = (1..policy.max_retries)
            .map(|a| policy.delay_before(a).as_secs())
            .collect();
        assert_eq!(delays, vec![2, 4, 8, 16]);
        assert_eq!(policy.total_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_scales_with_base() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250)).unwrap();
        assert_eq!(policy.delay_before(1), Duration::from_millis(500));
        assert_eq!(policy.delay_before(2), Duration::from_millis(1000));
        assert_eq!(policy.total_backoff(), Duration::from_millis(1500));
    }

    #[test]
    fn test_delay_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert!(policy.delay_before(40) >= policy.delay_before(32));
    }

    #[test]
    fn test_zero_retries_rejected() {
        assert!(matches!(
            RetryPolicy::new(0, Duration::from_secs(1)),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_from_env_reads_credentials_and_defaults_url() {
        std::env::set_var(API_URL_ENV, "");
        std::env::set_var(API_CLIENT_ID_ENV, "env-client");
        std::env::set_var(API_SECRET_ENV, "env-secret");

        let config = ProviderConfig::from_env();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.client_id, "env-client");
        assert_eq!(config.secret, "env-secret");

        std::env::set_var(API_URL_ENV, "https://api.example.test");
        assert_eq!(ProviderConfig::from_env().api_url, "https://api.example.test");

        for name in [API_URL_ENV, API_CLIENT_ID_ENV, API_SECRET_ENV] {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn test_url_for_joins_with_single_slash() {
        let config = ProviderConfig::new("https://api.example.test/", "id", "secret");
        assert_eq!(
            config.url_for("/service/server/info"),
            "https://api.example.test/service/server/info"
        );
        assert_eq!(
            config.url_for("service/queue"),
            "https://api.example.test/service/queue"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ProviderConfig::new("https://api.example.test", "id", "hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
