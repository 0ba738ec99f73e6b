//! HTTP Interceptor interfaces
//!
//! Two kinds of pluggable stages surround every physical attempt:
//!
//! - [`RequestAdapter`]s transform the outgoing request in registration
//!   order (signing, auth headers, tracing ids). An adapter error aborts the
//!   call before any network activity.
//! - [`ResponseObserver`]s witness the classified outcome of every attempt
//!   and any terminal error. They cannot change the result; their failures
//!   are logged and swallowed.
//!
//! Adapters and observers run sequentially within one call. The same chain is
//! shared read-only by every concurrent call.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;

use crate::error::NetworkError;
use crate::execution::outcome::Outcome;
use crate::types::HttpRequest;

/// Context passed to interceptors describing the call.
#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Stable for the whole logical call, across retries and refreshes.
    pub request_id: String,
    pub domain_key: String,
    pub method: Method,
    pub path: String,
    /// Physical attempt number, starting at 1.
    pub attempt: u32,
    pub stream: bool,
    pub mock: bool,
}

/// Generate a unique request id.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Transforms an outgoing request.
#[async_trait]
pub trait RequestAdapter: Send + Sync {
    /// Return the (possibly modified) request or an error to short-circuit the call.
    async fn adapt(
        &self,
        ctx: &RequestContext,
        request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError>;
}

/// Witnesses outcomes without affecting them.
#[async_trait]
pub trait ResponseObserver: Send + Sync {
    /// Called once per physical attempt with its classified outcome.
    async fn on_outcome(&self, ctx: &RequestContext, outcome: &Outcome) -> Result<(), NetworkError>;

    /// Called once when the call ends with an error.
    async fn on_terminal_error(
        &self,
        _ctx: &RequestContext,
        _error: &NetworkError,
    ) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// Ordered adapters and observers.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    adapters: Vec<Arc<dyn RequestAdapter>>,
    observers: Vec<Arc<dyn ResponseObserver>>,
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("adapters", &self.adapters.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_adapter(&mut self, adapter: Arc<dyn RequestAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn push_observer(&mut self, observer: Arc<dyn ResponseObserver>) {
        self.observers.push(observer);
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn RequestAdapter>) -> Self {
        self.push_adapter(adapter);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.push_observer(observer);
        self
    }

    /// Append `other`'s adapters and observers after this chain's.
    pub fn extend(&mut self, other: InterceptorChain) {
        self.adapters.extend(other.adapters);
        self.observers.extend(other.observers);
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty() && self.observers.is_empty()
    }

    /// Run every adapter in registration order.
    pub async fn adapt(
        &self,
        ctx: &RequestContext,
        mut request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError> {
        for adapter in &self.adapters {
            request = adapter.adapt(ctx, request).await?;
        }
        Ok(request)
    }

    /// Notify every observer of an attempt outcome.
    pub async fn observe(&self, ctx: &RequestContext, outcome: &Outcome) {
        for observer in &self.observers {
            if let Err(e) = observer.on_outcome(ctx, outcome).await {
                tracing::warn!(target: "callwire::http", request_id=%ctx.request_id, err=%e, "response observer failed");
            }
        }
    }

    /// Notify every observer of a terminal error.
    pub async fn observe_error(&self, ctx: &RequestContext, error: &NetworkError) {
        for observer in &self.observers {
            if let Err(e) = observer.on_terminal_error(ctx, error).await {
                tracing::warn!(target: "callwire::http", request_id=%ctx.request_id, err=%e, "response observer failed");
            }
        }
    }
}

/// Adapter backed by a plain closure.
pub struct FnAdapter<F>(F);

impl<F> FnAdapter<F>
where
    F: Fn(&RequestContext, HttpRequest) -> Result<HttpRequest, NetworkError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> RequestAdapter for FnAdapter<F>
where
    F: Fn(&RequestContext, HttpRequest) -> Result<HttpRequest, NetworkError> + Send + Sync,
{
    async fn adapt(
        &self,
        ctx: &RequestContext,
        request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError> {
        (self.0)(ctx, request)
    }
}

/// Adds fixed headers to every request, replacing existing values.
#[derive(Debug, Clone, Default)]
pub struct StaticHeadersAdapter {
    headers: reqwest::header::HeaderMap,
}

impl StaticHeadersAdapter {
    pub fn new(headers: reqwest::header::HeaderMap) -> Self {
        Self { headers }
    }
}

#[async_trait]
impl RequestAdapter for StaticHeadersAdapter {
    async fn adapt(
        &self,
        _ctx: &RequestContext,
        mut request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError> {
        for (name, value) in &self.headers {
            request.headers.insert(name.clone(), value.clone());
        }
        Ok(request)
    }
}

/// A simple logging interceptor backed by `tracing` (no bodies, no secrets).
#[derive(Clone, Default)]
pub struct LoggingInterceptor;

#[async_trait]
impl RequestAdapter for LoggingInterceptor {
    async fn adapt(
        &self,
        ctx: &RequestContext,
        request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError> {
        tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, method=%request.method, url=%request.url, attempt=ctx.attempt, stream=ctx.stream, "sending request");
        Ok(request)
    }
}

#[async_trait]
impl ResponseObserver for LoggingInterceptor {
    async fn on_outcome(&self, ctx: &RequestContext, outcome: &Outcome) -> Result<(), NetworkError> {
        match outcome {
            Outcome::Success(resp) => {
                tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, status=resp.status, bytes=resp.body.len(), mock=ctx.mock, "response received");
            }
            Outcome::TransientFailure(cause) => {
                tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, attempt=ctx.attempt, cause=%cause, "attempt failed");
            }
            Outcome::AuthExpired(resp) => {
                tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, status=resp.status, "credential expired");
            }
            Outcome::Cancelled => {
                tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, "attempt cancelled");
            }
        }
        Ok(())
    }

    async fn on_terminal_error(
        &self,
        ctx: &RequestContext,
        error: &NetworkError,
    ) -> Result<(), NetworkError> {
        tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, domain=%ctx.domain_key, path=%ctx.path, err=%error, "request error");
        Ok(())
    }
}
