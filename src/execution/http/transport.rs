//! HTTP transport abstraction.
//!
//! The execution engine never talks to a socket directly. It hands a fully
//! adapted [`HttpRequest`] to an injected [`Transport`], which performs one
//! request/response exchange or opens one event stream. Cancellation is
//! expressed by dropping the returned future.
//!
//! [`ReqwestTransport`](super::client::ReqwestTransport) is the default
//! implementation; tests and embedders may supply their own.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::error::FailureCause;
use crate::types::{HttpRequest, HttpResponse, StreamResponse};

/// Transport-level failure. Mapped to [`FailureCause`] before it reaches callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Io(String),
}

impl From<TransportError> for FailureCause {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => FailureCause::Timeout,
            TransportError::Connect(msg) => FailureCause::Connection(msg),
            TransportError::Io(msg) => FailureCause::Io(msg),
        }
    }
}

/// One request/response exchange, or one streaming connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and read the whole response body.
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError>;

    /// Send `request` and return as soon as the response head arrives.
    /// `timeout` bounds the handshake only.
    async fn open_stream(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<StreamResponse, TransportError>;
}
