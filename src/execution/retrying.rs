//! Retry and refresh loop around [`RequestExecutor`].
//!
//! Per logical call:
//! - `Success` is returned.
//! - `AuthExpired` parks on the [`TokenRefreshCoordinator`] and resends
//!   without spending a retry. This repeats until the refresh action fails
//!   or the caller cancels, unless a refresh cap was configured.
//! - `TransientFailure` consults the [`RetryPolicy`]; a retry waits
//!   `delay_for(retry)` on a cancellable sleep first.
//! - `Cancelled` ends the call.
//! - Mocked calls make exactly one attempt.
//!
//! Every attempt re-assembles the request from the unchanged descriptor, so a
//! refreshed credential reaches the wire through the adapters.

use std::sync::Arc;

use crate::auth::TokenRefreshCoordinator;
use crate::error::{NetworkError, RefreshFailure};
use crate::execution::executor::RequestExecutor;
use crate::execution::http::interceptor::{RequestContext, generate_request_id};
use crate::execution::outcome::Outcome;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::types::{HttpResponse, RequestDescriptor, Response};
use crate::utils::CancelHandle;

/// Drives attempts until success or a terminal error.
#[derive(Debug, Clone)]
pub struct RetryingExecutor {
    executor: Arc<RequestExecutor>,
    coordinator: TokenRefreshCoordinator,
    default_policy: Option<RetryPolicy>,
    max_refreshes: Option<u32>,
}

impl RetryingExecutor {
    pub fn new(
        executor: Arc<RequestExecutor>,
        coordinator: TokenRefreshCoordinator,
        default_policy: Option<RetryPolicy>,
    ) -> Self {
        Self {
            executor,
            coordinator,
            default_policy,
            max_refreshes: None,
        }
    }

    /// Refreshes one call may trigger before a repeated rejection is final.
    /// `None` (the default) never gives up on its own.
    pub fn with_max_refreshes(mut self, max_refreshes: Option<u32>) -> Self {
        self.max_refreshes = max_refreshes;
        self
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.executor
    }

    pub fn coordinator(&self) -> &TokenRefreshCoordinator {
        &self.coordinator
    }

    /// Descriptor override, then client default, then a single attempt.
    pub fn policy_for(&self, descriptor: &RequestDescriptor) -> RetryPolicy {
        descriptor
            .retry_policy
            .as_ref()
            .or(self.default_policy.as_ref())
            .cloned()
            .unwrap_or_else(RetryPolicy::none)
    }

    /// Run `descriptor` to completion.
    pub async fn run<T, D>(
        &self,
        descriptor: &RequestDescriptor,
        decode: &D,
        cancel: &CancelHandle,
    ) -> Result<Response<T>, NetworkError>
    where
        D: Fn(&HttpResponse) -> Result<T, String> + Send + Sync + ?Sized,
    {
        let request_id = generate_request_id();
        let policy = self.policy_for(descriptor);
        let mut retries = 0u32;
        let mut refreshes = 0u32;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let ctx = self.executor.context(descriptor, &request_id, attempt);
            let epoch = self.coordinator.epoch();

            let outcome = match self.executor.execute(&ctx, descriptor, decode, cancel).await {
                Ok(outcome) => outcome,
                Err(e) => return Err(self.terminal(&ctx, e).await),
            };

            match outcome {
                Outcome::Success(response) => return Ok(response),
                Outcome::AuthExpired(response) => {
                    if self.max_refreshes.is_some_and(|max| refreshes >= max) {
                        tracing::warn!(target: "callwire::retry", request_id=%request_id, status=response.status, refreshes, "credential still rejected after refresh");
                        let err = NetworkError::CredentialRefreshFailed(RefreshFailure::Failed(
                            format!("credential still rejected after {refreshes} refreshes"),
                        ));
                        return Err(self.terminal(&ctx, err).await);
                    }
                    refreshes += 1;
                    tracing::debug!(target: "callwire::retry", request_id=%request_id, attempt, "credential expired, refreshing");
                    if let Err(e) = self
                        .coordinator
                        .ensure_fresh_credential_since(epoch, cancel)
                        .await
                    {
                        return Err(self.terminal(&ctx, e).await);
                    }
                }
                Outcome::TransientFailure(cause) => {
                    // Mock answers are deterministic; a resend cannot change them.
                    let decision = if descriptor.flags.use_mock {
                        RetryDecision::Stop
                    } else {
                        policy.decide(&cause, retries)
                    };
                    let RetryDecision::RetryAfter(delay) = decision else {
                        let err = NetworkError::TransientFailure(cause);
                        return Err(self.terminal(&ctx, err).await);
                    };
                    retries += 1;
                    tracing::debug!(target: "callwire::retry", request_id=%request_id, retry=retries, max_retries=policy.max_retries, delay_ms=delay.as_millis() as u64, cause=%cause, "retrying after transient failure");
                    if let Err(e) = cancel.sleep(delay).await {
                        return Err(self.terminal(&ctx, e).await);
                    }
                }
                Outcome::Cancelled => {
                    return Err(self.terminal(&ctx, NetworkError::Cancelled).await);
                }
            }
        }
    }

    async fn terminal(&self, ctx: &RequestContext, error: NetworkError) -> NetworkError {
        tracing::debug!(target: "callwire::retry", request_id=%ctx.request_id, attempts=ctx.attempt, err=%error, "call failed");
        self.executor.chain().observe_error(ctx, &error).await;
        error
    }
}
