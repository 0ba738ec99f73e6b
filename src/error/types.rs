use bytes::Bytes;
use thiserror::Error;

/// Why a physical attempt failed in a way that may be retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The server answered with a status outside `200..400`.
    #[error("http status {code}{}", body_sample(.body))]
    Status { code: u16, body: Bytes },
    /// The transport gave up waiting.
    #[error("request timed out")]
    Timeout,
    /// The connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),
    /// Any other I/O failure reported by the transport.
    #[error("transport i/o error: {0}")]
    Io(String),
    /// A successful body could not be decoded into the requested type.
    #[error("failed to decode response: {0}")]
    Decode(String),
    /// An event stream ended or broke after it was opened.
    #[error("stream error: {0}")]
    Stream(String),
}

/// `": <first 200 chars>"`, or nothing for an empty body.
fn body_sample(body: &Bytes) -> String {
    let sample: String = String::from_utf8_lossy(body).chars().take(200).collect();
    if sample.is_empty() {
        sample
    } else {
        format!(": {sample}")
    }
}

impl FailureCause {
    /// Status code when the failure came from a server response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Server-side errors (5xx), timeouts and connection loss.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { code, .. } => (500..=599).contains(code),
            Self::Timeout | Self::Connection(_) => true,
            Self::Io(_) | Self::Decode(_) | Self::Stream(_) => false,
        }
    }
}

/// Why a credential refresh did not produce a fresh credential.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// The client was built without a refresh action.
    #[error("no refresh action configured")]
    NotConfigured,
    /// The refresh action ran and failed.
    #[error("{0}")]
    Failed(String),
    /// The refresh task went away without reporting a result.
    #[error("refresh task terminated without a result")]
    Abandoned,
}

/// Terminal error surfaced to callers.
///
/// Cloneable so that a single refresh failure can be handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// The domain key or URL could not be resolved. Never retried.
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Network, 5xx or decode failure, surfaced after the retry policy gave up.
    #[error("Transient failure: {0}")]
    TransientFailure(FailureCause),

    /// The credential could not be refreshed. Terminates every waiter.
    #[error("Credential refresh failed: {0}")]
    CredentialRefreshFailed(RefreshFailure),

    /// The caller cancelled the call.
    #[error("Request cancelled")]
    Cancelled,

    /// A request adapter rejected the outgoing request.
    #[error("Interceptor error: {0}")]
    Interceptor(String),

    /// `use_mock` was set but no canned payload could be found.
    #[error("Mock data not found: {0}")]
    MockDataNotFound(String),

    /// Local file system failure (download destinations, upload sources).
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid client configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl NetworkError {
    /// Wrap a status code and body into a transient failure.
    pub fn status(code: u16, body: impl Into<Bytes>) -> Self {
        Self::TransientFailure(FailureCause::Status {
            code,
            body: body.into(),
        })
    }

    /// Create a refresh failure from any displayable cause.
    pub fn refresh_failed(reason: impl std::fmt::Display) -> Self {
        Self::CredentialRefreshFailed(RefreshFailure::Failed(reason.to_string()))
    }

    /// Whether the default retry condition would retry this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientFailure(cause) => cause.is_retryable(),
            _ => false,
        }
    }

    /// HTTP status when the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::TransientFailure(cause) => cause.status_code(),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_refresh_failure(&self) -> bool {
        matches!(self, Self::CredentialRefreshFailed(_))
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_connection_loss_are_retryable() {
        assert!(NetworkError::status(503, "").is_retryable());
        assert!(NetworkError::TransientFailure(FailureCause::Timeout).is_retryable());
        assert!(
            NetworkError::TransientFailure(FailureCause::Connection("reset".into())).is_retryable()
        );
        assert!(!NetworkError::status(404, "").is_retryable());
        assert!(
            !NetworkError::TransientFailure(FailureCause::Decode("eof".into())).is_retryable()
        );
        assert!(!NetworkError::Cancelled.is_retryable());
        assert!(!NetworkError::refresh_failed("denied").is_retryable());
    }

    #[test]
    fn status_display_truncates_body() {
        let body = "x".repeat(500);
        let msg = NetworkError::status(502, body).to_string();
        assert!(msg.starts_with("Transient failure: http status 502: "));
        assert!(msg.len() < 260);
    }

    #[test]
    fn cause_messages_read_plainly() {
        assert_eq!(NetworkError::status(404, "").to_string(), "Transient failure: http status 404");
        assert_eq!(FailureCause::Timeout.to_string(), "request timed out");
        assert_eq!(
            NetworkError::refresh_failed("denied").to_string(),
            "Credential refresh failed: denied"
        );
        assert_eq!(RefreshFailure::NotConfigured.to_string(), "no refresh action configured");
    }

    #[test]
    fn not_configured_is_distinct_from_failed_refresh() {
        let a = NetworkError::CredentialRefreshFailed(RefreshFailure::NotConfigured);
        let b = NetworkError::refresh_failed("401 from auth server");
        assert_ne!(a, b);
        assert!(a.is_refresh_failure() && b.is_refresh_failure());
    }
}
