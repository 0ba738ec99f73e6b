//! Default Configuration Values
//!
//! This module centralizes the default values used throughout the crate.

use std::time::Duration;

/// Request/response execution defaults
pub mod http {
    use super::*;

    /// Default timeout for one request/response exchange.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default connection timeout used by the reqwest transport.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default User-Agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("callwire/", env!("CARGO_PKG_VERSION"));
}

/// Retry defaults
pub mod retry {
    use super::*;

    /// Retries allowed after the first attempt.
    pub const MAX_RETRIES: u32 = 3;

    /// Exponential base, in seconds: the n-th retry waits `base^n` seconds.
    pub const BACKOFF_BASE_SECS: f64 = 2.0;

    /// Upper bound for a single backoff delay.
    pub const BACKOFF_CAP: Duration = Duration::from_secs(60);
}

/// Event-stream defaults
pub mod stream {
    use super::*;

    /// Idle timeout for long-lived event streams.
    pub const TIMEOUT: Duration = Duration::from_secs(300);

    /// Reconnect attempts after a stream error.
    pub const RECONNECT_MAX_RETRIES: u32 = 3;

    /// Fixed delay before each reconnect.
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);
}
