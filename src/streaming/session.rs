//! Long-lived event-stream sessions with auto-reconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use bytes::BytesMut;
use eventsource_stream::{EventStreamError, Eventsource};
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::DropGuard;

use super::events::{SseEvent, StreamConnectionState, StreamEventHandler, StreamRequest};
use crate::auth::TokenRefreshCoordinator;
use crate::error::{FailureCause, NetworkError, RefreshFailure};
use crate::execution::executor::RequestExecutor;
use crate::execution::http::interceptor::{RequestContext, generate_request_id};
use crate::execution::http::transport::TransportError;
use crate::execution::outcome::{Outcome, classify_response};
use crate::types::{AutoReconnect, ByteStream, HttpResponse, StreamResponse};
use crate::utils::CancelHandle;

/// Error bodies larger than this are truncated before classification.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

/// Opens event streams for one client.
#[derive(Debug, Clone)]
pub struct StreamSession {
    executor: Arc<RequestExecutor>,
    coordinator: TokenRefreshCoordinator,
    stream_timeout: Duration,
    reconnect: AutoReconnect,
    max_refreshes: Option<u32>,
}

/// Caller's view of a running session.
///
/// Clones share the session. Dropping the last clone disconnects it.
#[derive(Debug, Clone)]
pub struct StreamHandle {
    state: Arc<watch::Sender<StreamConnectionState>>,
    attempts: Arc<AtomicU32>,
    cancel: CancelHandle,
    _guard: Arc<DropGuard>,
}

impl StreamHandle {
    pub fn state(&self) -> StreamConnectionState {
        *self.state.borrow()
    }

    /// Reconnects spent since the last successful connection.
    pub fn reconnect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<StreamConnectionState> {
        self.state.subscribe()
    }

    /// Stop the session. Cancels any in-flight dial, read, refresh wait or
    /// reconnect delay; the state is `Disconnected` when this returns.
    pub fn disconnect(&self) {
        self.cancel.cancel();
        self.state.send_replace(StreamConnectionState::Disconnected);
    }

    pub fn is_connected(&self) -> bool {
        self.state() == StreamConnectionState::Connected
    }

    /// Resolves once the session has settled in `Disconnected`.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx
            .wait_for(|s| *s == StreamConnectionState::Disconnected)
            .await;
    }
}

/// How one connection ended.
enum ConnectionEnd {
    Cancelled,
    AuthExpired,
    /// Retryable through the reconnect policy.
    Failed(NetworkError),
    /// Not worth redialing.
    Fatal(NetworkError),
}

/// State shared between a handle and its driver task.
struct Driver {
    session: StreamSession,
    request: StreamRequest,
    handler: Arc<dyn StreamEventHandler>,
    state: Arc<watch::Sender<StreamConnectionState>>,
    attempts: Arc<AtomicU32>,
    cancel: CancelHandle,
    reconnect: AutoReconnect,
    timeout: Duration,
    request_id: String,
}

impl StreamSession {
    pub fn new(
        executor: Arc<RequestExecutor>,
        coordinator: TokenRefreshCoordinator,
        stream_timeout: Duration,
        reconnect: AutoReconnect,
    ) -> Self {
        Self {
            executor,
            coordinator,
            stream_timeout,
            reconnect,
            max_refreshes: None,
        }
    }

    /// Refreshes one connection may trigger before a repeated rejection is
    /// final. `None` (the default) keeps refreshing until the refresh fails.
    pub fn with_max_refreshes(mut self, max_refreshes: Option<u32>) -> Self {
        self.max_refreshes = max_refreshes;
        self
    }

    /// Start a session on its own task and return a handle to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(
        &self,
        request: StreamRequest,
        handler: Arc<dyn StreamEventHandler>,
    ) -> StreamHandle {
        let (state, _) = watch::channel(StreamConnectionState::Connecting);
        let state = Arc::new(state);
        let attempts = Arc::new(AtomicU32::new(0));
        let cancel = CancelHandle::new();

        let driver = Driver {
            session: self.clone(),
            reconnect: request.reconnect.unwrap_or(self.reconnect),
            timeout: request.descriptor.timeout.unwrap_or(self.stream_timeout),
            request,
            handler,
            state: Arc::clone(&state),
            attempts: Arc::clone(&attempts),
            cancel: cancel.clone(),
            request_id: generate_request_id(),
        };
        tokio::spawn(driver.run());

        StreamHandle {
            state,
            attempts,
            _guard: Arc::new(cancel.drop_guard()),
            cancel,
        }
    }
}

impl Driver {
    /// Publish `next` unless the session was disconnected.
    fn set_state(&self, next: StreamConnectionState) {
        let cancel = &self.cancel;
        self.state.send_if_modified(|current| {
            if cancel.is_cancelled() || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn context(&self, attempt: u32) -> RequestContext {
        let mut ctx = self
            .session
            .executor
            .context(&self.request.descriptor, &self.request_id, attempt);
        ctx.stream = true;
        ctx
    }

    async fn run(self) {
        let mut dials = 0u32;
        let mut refreshes = 0u32;

        loop {
            self.set_state(StreamConnectionState::Connecting);
            dials += 1;
            let ctx = self.context(dials);
            let epoch = self.session.coordinator.epoch();

            let error = match self.connect_once(&ctx, &mut refreshes).await {
                ConnectionEnd::Cancelled => break,
                ConnectionEnd::AuthExpired => {
                    if self
                        .session
                        .max_refreshes
                        .is_some_and(|max| refreshes >= max)
                    {
                        let err = NetworkError::CredentialRefreshFailed(RefreshFailure::Failed(
                            format!("credential still rejected after {refreshes} refreshes"),
                        ));
                        self.fail(&ctx, &err).await;
                        break;
                    }
                    refreshes += 1;
                    tracing::debug!(target: "callwire::sse", request_id=%self.request_id, "stream credential expired, refreshing");
                    match self
                        .session
                        .coordinator
                        .ensure_fresh_credential_since(epoch, &self.cancel)
                        .await
                    {
                        Ok(()) => continue,
                        Err(NetworkError::Cancelled) => break,
                        Err(e) => {
                            self.fail(&ctx, &e).await;
                            break;
                        }
                    }
                }
                ConnectionEnd::Fatal(e) => {
                    self.fail(&ctx, &e).await;
                    break;
                }
                ConnectionEnd::Failed(e) => e,
            };

            if self.cancel.is_cancelled() {
                break;
            }
            self.handler.on_error(&error);
            self.handler.on_connectivity_changed(false);

            let spent = self.attempts.load(Ordering::SeqCst);
            if !self.reconnect.enabled || spent >= self.reconnect.max_retry_count {
                tracing::debug!(target: "callwire::sse", request_id=%self.request_id, attempts=spent, err=%error, "stream closed");
                self.session
                    .executor
                    .chain()
                    .observe_error(&ctx, &error)
                    .await;
                break;
            }

            self.attempts.store(spent + 1, Ordering::SeqCst);
            self.set_state(StreamConnectionState::Reconnecting);
            tracing::debug!(target: "callwire::sse", request_id=%self.request_id, attempt=spent + 1, max=self.reconnect.max_retry_count, delay_ms=self.reconnect.retry_delay.as_millis() as u64, err=%error, "reconnecting stream");
            if self.cancel.sleep(self.reconnect.retry_delay).await.is_err() {
                break;
            }
        }

        self.set_state(StreamConnectionState::Disconnected);
    }

    /// Report a fatal error the way every failed attempt is reported.
    async fn fail(&self, ctx: &RequestContext, error: &NetworkError) {
        if self.cancel.is_cancelled() {
            return;
        }
        tracing::warn!(target: "callwire::sse", request_id=%self.request_id, err=%error, "stream stopped");
        self.handler.on_error(error);
        self.handler.on_connectivity_changed(false);
        self.session
            .executor
            .chain()
            .observe_error(ctx, error)
            .await;
    }

    async fn connect_once(&self, ctx: &RequestContext, refreshes: &mut u32) -> ConnectionEnd {
        let executor = &self.session.executor;
        let request = match executor.prepare(ctx, &self.request.descriptor).await {
            Ok(request) => request,
            Err(e) => return ConnectionEnd::Fatal(e),
        };

        let opened = self
            .cancel
            .run(executor.transport().open_stream(request, self.timeout))
            .await;
        let response = match opened {
            Err(_) => return ConnectionEnd::Cancelled,
            Ok(Err(e)) => {
                let cause = FailureCause::from(e);
                executor
                    .chain()
                    .observe(ctx, &Outcome::TransientFailure(cause.clone()))
                    .await;
                return ConnectionEnd::Failed(NetworkError::TransientFailure(cause));
            }
            Ok(Ok(response)) => response,
        };

        let StreamResponse {
            status,
            headers,
            body,
        } = response;
        let head = HttpResponse {
            status,
            headers,
            body: Default::default(),
        };
        if !head.is_success() {
            let error_body = match self.cancel.run(read_error_body(body, self.timeout)).await {
                Ok(error_body) => error_body,
                Err(_) => return ConnectionEnd::Cancelled,
            };
            let head = HttpResponse {
                body: error_body,
                ..head
            };
            return self.check_status(ctx, head).await.unwrap_or_else(|| {
                ConnectionEnd::Failed(NetworkError::TransientFailure(FailureCause::Status {
                    code: status,
                    body: Default::default(),
                }))
            });
        }

        if let Some(end) = self.check_status(ctx, head).await {
            return end;
        }
        if status == 204 {
            return ConnectionEnd::Failed(NetworkError::TransientFailure(FailureCause::Stream(
                "server answered without a stream body".into(),
            )));
        }

        self.read_events(body, refreshes).await
    }

    /// Classify and observe the response head; `None` means the stream may be read.
    async fn check_status(&self, ctx: &RequestContext, head: HttpResponse) -> Option<ConnectionEnd> {
        let executor = &self.session.executor;
        let outcome = classify_response(
            head,
            self.request.descriptor.flags.requires_auth,
            executor.auth_expired().as_ref(),
        );
        executor.chain().observe(ctx, &outcome).await;
        match outcome {
            Outcome::Success(_) => None,
            Outcome::AuthExpired(_) => Some(ConnectionEnd::AuthExpired),
            Outcome::TransientFailure(cause) => {
                Some(ConnectionEnd::Failed(NetworkError::TransientFailure(cause)))
            }
            Outcome::Cancelled => Some(ConnectionEnd::Cancelled),
        }
    }

    async fn read_events(&self, body: ByteStream, refreshes: &mut u32) -> ConnectionEnd {
        let mut events = body.eventsource();
        let mut connected = false;

        loop {
            let next = self
                .cancel
                .run(tokio::time::timeout(self.timeout, events.next()))
                .await;
            let event = match next {
                Err(_) => return ConnectionEnd::Cancelled,
                Ok(Err(_)) => {
                    return ConnectionEnd::Failed(NetworkError::TransientFailure(
                        FailureCause::Timeout,
                    ));
                }
                Ok(Ok(None)) => {
                    return ConnectionEnd::Failed(NetworkError::TransientFailure(
                        FailureCause::Stream("server closed the stream".into()),
                    ));
                }
                Ok(Ok(Some(Err(e)))) => return ConnectionEnd::Failed(e.into()),
                Ok(Ok(Some(Ok(event)))) => event,
            };

            if self.cancel.is_cancelled() {
                return ConnectionEnd::Cancelled;
            }
            if !connected {
                connected = true;
                *refreshes = 0;
                self.attempts.store(0, Ordering::SeqCst);
                self.set_state(StreamConnectionState::Connected);
                tracing::debug!(target: "callwire::sse", request_id=%self.request_id, "stream connected");
                self.handler.on_connectivity_changed(true);
            }
            self.handler.on_event(SseEvent::from(event));
        }
    }
}

/// Read (a bounded prefix of) a non-success stream body.
async fn read_error_body(mut body: ByteStream, timeout: Duration) -> bytes::Bytes {
    let mut buf = BytesMut::new();
    let read = async {
        while let Some(Ok(chunk)) = body.next().await {
            let room = ERROR_BODY_LIMIT.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if buf.len() >= ERROR_BODY_LIMIT {
                break;
            }
        }
    };
    let _ = tokio::time::timeout(timeout, read).await;
    buf.freeze()
}

impl From<EventStreamError<TransportError>> for NetworkError {
    fn from(err: EventStreamError<TransportError>) -> Self {
        match err {
            EventStreamError::Transport(te) => NetworkError::TransientFailure(te.into()),
            other => NetworkError::TransientFailure(FailureCause::Stream(other.to_string())),
        }
    }
}
