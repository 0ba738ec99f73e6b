//! Client configuration types.
//!
//! `ClientConfig` carries the execution defaults every call falls back to
//! when its descriptor does not override them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::defaults;
use crate::retry::RetryPolicy;

/// Auto-reconnect behavior for event streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReconnect {
    /// Whether a failed stream is re-dialed at all.
    pub enabled: bool,
    /// Reconnects allowed before the session settles in `Disconnected`.
    pub max_retry_count: u32,
    /// Fixed wait before each reconnect.
    #[serde(with = "duration_millis_serde")]
    pub retry_delay: Duration,
}

impl Default for AutoReconnect {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retry_count: defaults::stream::RECONNECT_MAX_RETRIES,
            retry_delay: defaults::stream::RECONNECT_DELAY,
        }
    }
}

impl AutoReconnect {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub const fn with_max_retry_count(mut self, count: u32) -> Self {
        self.max_retry_count = count;
        self
    }

    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Execution defaults shared by every call made through one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for one request/response exchange.
    pub request_timeout: Duration,
    /// Retry policy used when a descriptor does not carry its own.
    /// `None` means a single attempt.
    pub retry_policy: Option<RetryPolicy>,
    /// Handshake and idle timeout for event streams.
    pub stream_timeout: Duration,
    /// Reconnect behavior for event streams that do not override it.
    pub auto_reconnect: AutoReconnect,
    /// Credential refreshes one call or stream connection may trigger
    /// before a repeated rejection is final. `None` means no limit.
    pub max_refreshes: Option<u32>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: defaults::http::REQUEST_TIMEOUT,
            retry_policy: Some(RetryPolicy::default()),
            stream_timeout: defaults::stream::TIMEOUT,
            auto_reconnect: AutoReconnect::default(),
            max_refreshes: None,
        }
    }
}

impl ClientConfig {
    /// Returns a builder for constructing `ClientConfig`
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }
}

/// Builder for `ClientConfig`
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    request_timeout: Option<Duration>,
    retry_policy: Option<Option<RetryPolicy>>,
    stream_timeout: Option<Duration>,
    auto_reconnect: Option<AutoReconnect>,
    max_refreshes: Option<u32>,
}

impl ClientConfigBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(Some(policy));
        self
    }

    /// Disable client-level retries; descriptors may still opt in.
    pub fn no_retry(mut self) -> Self {
        self.retry_policy = Some(None);
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub fn auto_reconnect(mut self, auto_reconnect: AutoReconnect) -> Self {
        self.auto_reconnect = Some(auto_reconnect);
        self
    }

    pub fn max_refreshes(mut self, max_refreshes: u32) -> Self {
        self.max_refreshes = Some(max_refreshes);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
            retry_policy: self.retry_policy.unwrap_or(defaults.retry_policy),
            stream_timeout: self.stream_timeout.unwrap_or(defaults.stream_timeout),
            auto_reconnect: self.auto_reconnect.unwrap_or(defaults.auto_reconnect),
            max_refreshes: self.max_refreshes.or(defaults.max_refreshes),
        }
    }
}

// Helper module for Duration serialization
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
