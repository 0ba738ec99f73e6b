//! Single-attempt execution.
//!
//! [`RequestExecutor`] performs exactly one physical attempt: assemble the
//! request from its descriptor, run the adapters, hand it to the transport,
//! classify what came back, let the observers see it. It never retries and
//! never refreshes; that is the job of
//! [`RetryingExecutor`](super::retrying::RetryingExecutor).

use std::sync::Arc;
use std::time::Duration;

use crate::domain::AddressResolver;
use crate::error::{FailureCause, NetworkError};
use crate::execution::http::builder::RequestAssembler;
use crate::execution::http::interceptor::{InterceptorChain, RequestContext};
use crate::execution::http::transport::{Transport, TransportError};
use crate::execution::outcome::{AuthExpiryPredicate, Outcome, classify_response};
use crate::mock::{FixtureLoader, resolve_mock_payload};
use crate::types::{HttpRequest, HttpResponse, RequestDescriptor, Response};
use crate::utils::CancelHandle;

/// Decode the body as JSON. An empty body decodes as `null`, so `()` and
/// `Option<_>` accept `204 No Content`.
pub fn json_decoder<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T, String> {
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|e| e.to_string())
}

/// Keep the raw response.
pub fn raw_decoder(response: &HttpResponse) -> Result<HttpResponse, String> {
    Ok(response.clone())
}

/// Everything one attempt needs, shared by all calls of a client.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    resolver: Arc<dyn AddressResolver>,
    assembler: RequestAssembler,
    chain: InterceptorChain,
    auth_expired: AuthExpiryPredicate,
    fixtures: Option<Arc<dyn FixtureLoader>>,
    default_timeout: Duration,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("assembler", &self.assembler)
            .field("chain", &self.chain)
            .field("fixtures", &self.fixtures.is_some())
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl RequestExecutor {
    pub fn new(
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn AddressResolver>,
        assembler: RequestAssembler,
        chain: InterceptorChain,
        auth_expired: AuthExpiryPredicate,
        fixtures: Option<Arc<dyn FixtureLoader>>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            assembler,
            chain,
            auth_expired,
            fixtures,
            default_timeout,
        }
    }

    pub fn chain(&self) -> &InterceptorChain {
        &self.chain
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub(crate) fn auth_expired(&self) -> &AuthExpiryPredicate {
        &self.auth_expired
    }

    /// Context for one attempt of `descriptor`.
    pub fn context(
        &self,
        descriptor: &RequestDescriptor,
        request_id: &str,
        attempt: u32,
    ) -> RequestContext {
        RequestContext {
            request_id: request_id.to_string(),
            domain_key: descriptor.domain_key.clone(),
            method: descriptor.method.clone(),
            path: descriptor.path.clone(),
            attempt,
            stream: false,
            mock: descriptor.flags.use_mock,
        }
    }

    /// Assemble and adapt the outgoing request for `ctx`.
    pub async fn prepare(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
    ) -> Result<HttpRequest, NetworkError> {
        let request = self.assembler.assemble(self.resolver.as_ref(), descriptor)?;
        self.chain.adapt(ctx, request).await
    }

    /// Run one attempt and decode a successful body with `decode`.
    ///
    /// `Err` is reserved for failures that happen before the network is
    /// touched (unresolvable target, adapter rejection, missing mock data);
    /// everything after that is an [`Outcome`].
    pub async fn execute<T, D>(
        &self,
        ctx: &RequestContext,
        descriptor: &RequestDescriptor,
        decode: &D,
        cancel: &CancelHandle,
    ) -> Result<Outcome<Response<T>>, NetworkError>
    where
        D: Fn(&HttpResponse) -> Result<T, String> + Send + Sync + ?Sized,
    {
        let raw = if descriptor.flags.use_mock {
            let payload = resolve_mock_payload(descriptor, self.fixtures.as_deref()).await?;
            tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, bytes=payload.len(), "answering from mock data");
            Outcome::Success(HttpResponse::new(200, payload))
        } else if cancel.is_cancelled() {
            Outcome::Cancelled
        } else {
            let request = self.prepare(ctx, descriptor).await?;
            let timeout = descriptor.timeout.unwrap_or(self.default_timeout);
            self.send(request, timeout, descriptor.flags.requires_auth, cancel)
                .await
        };

        let failure = match raw.split() {
            Ok(response) => match decode(&response) {
                Ok(value) => {
                    let observed = Outcome::Success(response);
                    self.chain.observe(ctx, &observed).await;
                    return Ok(observed.map(|response| Response {
                        value,
                        status: response.status,
                        headers: response.headers,
                    }));
                }
                Err(e) => {
                    tracing::debug!(target: "callwire::http", request_id=%ctx.request_id, err=%e, "response body did not decode");
                    Outcome::TransientFailure(FailureCause::Decode(e))
                }
            },
            Err(failure) => failure,
        };

        self.chain.observe(ctx, &failure.clone().widen()).await;
        Ok(failure.widen())
    }

    async fn send(
        &self,
        request: HttpRequest,
        timeout: Duration,
        requires_auth: bool,
        cancel: &CancelHandle,
    ) -> Outcome {
        let exchange = tokio::time::timeout(timeout, self.transport.execute(request, timeout));
        match cancel.run(exchange).await {
            Err(_) => Outcome::Cancelled,
            Ok(Err(_elapsed)) => Outcome::TransientFailure(TransportError::Timeout.into()),
            Ok(Ok(Err(e))) => Outcome::TransientFailure(e.into()),
            Ok(Ok(Ok(response))) => {
                classify_response(response, requires_auth, self.auth_expired.as_ref())
            }
        }
    }
}
