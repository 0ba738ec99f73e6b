//! Classified result of one physical attempt.

use std::convert::Infallible;

use crate::error::FailureCause;
use crate::types::{HttpResponse, is_success_status};

/// Outcome of a single transport attempt.
///
/// Produced once per attempt and consumed immediately by the retry loop.
/// `AuthExpired` never escapes the crate as an error; it is recovered by the
/// refresh coordinator or turned into `CredentialRefreshFailed`.
#[derive(Debug, Clone)]
pub enum Outcome<T = HttpResponse> {
    Success(T),
    TransientFailure(FailureCause),
    /// The server rejected the credential; carries the rejecting response.
    AuthExpired(HttpResponse),
    Cancelled,
}

impl<T> Outcome<T> {
    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::TransientFailure(_) => "transient_failure",
            Self::AuthExpired(_) => "auth_expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(v) => Outcome::Success(f(v)),
            Self::TransientFailure(c) => Outcome::TransientFailure(c),
            Self::AuthExpired(r) => Outcome::AuthExpired(r),
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

impl Outcome {
    /// Split off the success payload. Failures keep their shape under any
    /// payload type via [`Outcome::widen`].
    pub fn split(self) -> Result<HttpResponse, Outcome<Infallible>> {
        match self {
            Self::Success(response) => Ok(response),
            Self::TransientFailure(cause) => Err(Outcome::TransientFailure(cause)),
            Self::AuthExpired(response) => Err(Outcome::AuthExpired(response)),
            Self::Cancelled => Err(Outcome::Cancelled),
        }
    }
}

impl Outcome<Infallible> {
    pub fn widen<U>(self) -> Outcome<U> {
        self.map(|never| match never {})
    }
}

/// Decides whether a failed response means the credential expired.
pub type AuthExpiryPredicate = std::sync::Arc<dyn Fn(u16, &[u8]) -> bool + Send + Sync>;

/// The stock predicate: `401 Unauthorized`.
pub fn unauthorized_predicate() -> AuthExpiryPredicate {
    std::sync::Arc::new(|status, _| status == 401)
}

/// Classify a complete response.
pub fn classify_response(
    response: HttpResponse,
    requires_auth: bool,
    auth_expired: &(dyn Fn(u16, &[u8]) -> bool + Send + Sync),
) -> Outcome {
    if is_success_status(response.status) {
        return Outcome::Success(response);
    }
    if requires_auth && auth_expired(response.status, &response.body) {
        return Outcome::AuthExpired(response);
    }
    Outcome::TransientFailure(FailureCause::Status {
        code: response.status,
        body: response.body,
    })
}
