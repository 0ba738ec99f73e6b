//! Client
//!
//! [`Client`] is the entry point: it owns one refresh coordinator, one
//! interceptor chain and the execution defaults, and shares them between
//! every call and every event stream it starts. Cloning a client is cheap
//! and clones share all of that state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::auth::{CredentialRefresher, TokenRefreshCoordinator, refresh_fn};
use crate::domain::AddressResolver;
use crate::download::{DownloadRequest, DownloadResponse, save};
use crate::error::NetworkError;
use crate::execution::executor::{RequestExecutor, json_decoder, raw_decoder};
use crate::execution::http::builder::RequestAssembler;
use crate::execution::http::client::ReqwestTransport;
use crate::execution::http::interceptor::{
    InterceptorChain, LoggingInterceptor, RequestAdapter, ResponseObserver,
};
use crate::execution::http::transport::Transport;
use crate::execution::outcome::{AuthExpiryPredicate, unauthorized_predicate};
use crate::execution::retrying::RetryingExecutor;
use crate::mock::FixtureLoader;
use crate::retry::RetryPolicy;
use crate::streaming::{StreamEventHandler, StreamHandle, StreamRequest, StreamSession};
use crate::types::{AutoReconnect, ClientConfig, HttpResponse, RequestDescriptor, Response};
use crate::upload::{UploadRequest, UploadResponse};
use crate::utils::CancelHandle;

struct ClientInner {
    retrying: RetryingExecutor,
    streams: StreamSession,
    config: ClientConfig,
}

/// Authenticated request executor.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .field("coordinator", self.coordinator())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The client's refresh coordinator, shared by calls and streams.
    pub fn coordinator(&self) -> &TokenRefreshCoordinator {
        self.inner.retrying.coordinator()
    }

    /// Execute `descriptor` and decode the JSON body.
    pub async fn execute<T>(&self, descriptor: &RequestDescriptor) -> Result<T, NetworkError>
    where
        T: DeserializeOwned + Send,
    {
        self.execute_with_cancel(descriptor, &CancelHandle::new())
            .await
    }

    /// [`execute`](Self::execute) with a cancellation handle.
    pub async fn execute_with_cancel<T>(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelHandle,
    ) -> Result<T, NetworkError>
    where
        T: DeserializeOwned + Send,
    {
        self.execute_response(descriptor, cancel)
            .await
            .map(Response::into_value)
    }

    /// Decoded value together with status and headers.
    pub async fn execute_response<T>(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelHandle,
    ) -> Result<Response<T>, NetworkError>
    where
        T: DeserializeOwned + Send,
    {
        self.inner
            .retrying
            .run(descriptor, &json_decoder::<T>, cancel)
            .await
    }

    /// The raw successful response, body undecoded.
    pub async fn execute_bytes(
        &self,
        descriptor: &RequestDescriptor,
        cancel: &CancelHandle,
    ) -> Result<HttpResponse, NetworkError> {
        self.inner
            .retrying
            .run(descriptor, &raw_decoder, cancel)
            .await
            .map(Response::into_value)
    }

    /// Send a multipart upload and decode the JSON response.
    pub async fn upload<T>(
        &self,
        request: UploadRequest,
        cancel: &CancelHandle,
    ) -> Result<UploadResponse<T>, NetworkError>
    where
        T: DeserializeOwned + Send,
    {
        let descriptor = request.into_descriptor()?;
        let total_bytes_sent = descriptor.multipart.as_ref().map_or(0, |f| f.payload_len());
        let response = self.execute_response(&descriptor, cancel).await?;
        Ok(UploadResponse {
            response,
            total_bytes_sent,
        })
    }

    /// Execute the call and write the body to the request's destination.
    pub async fn download(
        &self,
        request: DownloadRequest,
        cancel: &CancelHandle,
    ) -> Result<DownloadResponse, NetworkError> {
        let response = self.execute_bytes(&request.descriptor, cancel).await?;
        let path = request.destination.resolve(&request.descriptor);
        save(&path, &response).await
    }

    /// Open an event stream. Runs until [`StreamHandle::disconnect`], until
    /// reconnects are exhausted, or until every clone of the returned handle
    /// is dropped. Must be called within a Tokio runtime.
    pub fn connect_stream(
        &self,
        request: StreamRequest,
        handler: Arc<dyn StreamEventHandler>,
    ) -> StreamHandle {
        self.inner.streams.connect(request, handler)
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    http_client: Option<reqwest::Client>,
    resolver: Option<Arc<dyn AddressResolver>>,
    assembler: RequestAssembler,
    chain: InterceptorChain,
    http_debug: bool,
    refresher: Option<Arc<dyn CredentialRefresher>>,
    auth_expired: Option<AuthExpiryPredicate>,
    fixtures: Option<Arc<dyn FixtureLoader>>,
    config: ClientConfig,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            http_client: None,
            resolver: None,
            assembler: RequestAssembler::new(),
            chain: InterceptorChain::new(),
            http_debug: false,
            refresher: None,
            auth_expired: None,
            fixtures: None,
            config: ClientConfig::default(),
        }
    }

    // ========================================================================
    // Transport and addressing
    // ========================================================================

    /// Set a custom transport (takes precedence over `with_http_client`).
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a preconfigured reqwest client for the default transport.
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Set the domain resolver. Required.
    pub fn resolver(mut self, resolver: impl AddressResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    /// Set a resolver the caller keeps a handle to, e.g. a
    /// [`DomainRegistry`](crate::domain::DomainRegistry) whose environment
    /// is switched at runtime.
    pub fn shared_resolver(mut self, resolver: Arc<dyn AddressResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Headers added to every request; per-request headers win.
    pub fn common_headers<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HashMap<String, String> + Send + Sync + 'static,
    {
        self.assembler = self.assembler.with_common_headers(Arc::new(provider));
        self
    }

    /// Query parameters added to every request; per-request values win.
    pub fn common_query<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> HashMap<String, String> + Send + Sync + 'static,
    {
        self.assembler = self.assembler.with_common_query(Arc::new(provider));
        self
    }

    // ========================================================================
    // Interceptors
    // ========================================================================

    pub fn adapter(mut self, adapter: Arc<dyn RequestAdapter>) -> Self {
        self.chain.push_adapter(adapter);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ResponseObserver>) -> Self {
        self.chain.push_observer(observer);
        self
    }

    /// Register a value that is both an adapter and an observer.
    pub fn interceptor<I>(mut self, interceptor: I) -> Self
    where
        I: RequestAdapter + ResponseObserver + 'static,
    {
        let interceptor = Arc::new(interceptor);
        self.chain.push_adapter(interceptor.clone());
        self.chain.push_observer(interceptor);
        self
    }

    /// Enable the built-in logging interceptor (runs first).
    pub fn http_debug(mut self, enabled: bool) -> Self {
        self.http_debug = enabled;
        self
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    pub fn refresher(mut self, refresher: Arc<dyn CredentialRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Refresh action from an async closure.
    pub fn refresh_with<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), NetworkError>> + Send + 'static,
    {
        self.refresher(refresh_fn(f))
    }

    /// Decide auth expiry from status and body. Defaults to `status == 401`.
    pub fn auth_expiry_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(u16, &[u8]) -> bool + Send + Sync + 'static,
    {
        self.auth_expired = Some(Arc::new(predicate));
        self
    }

    // ========================================================================
    // Mocking and configuration
    // ========================================================================

    pub fn fixtures(mut self, loader: impl FixtureLoader + 'static) -> Self {
        self.fixtures = Some(Arc::new(loader));
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = Some(policy);
        self
    }

    /// Single attempt unless a descriptor carries its own policy.
    pub fn no_retry(mut self) -> Self {
        self.config.retry_policy = None;
        self
    }

    pub fn stream_timeout(mut self, timeout: Duration) -> Self {
        self.config.stream_timeout = timeout;
        self
    }

    pub fn auto_reconnect(mut self, auto_reconnect: AutoReconnect) -> Self {
        self.config.auto_reconnect = auto_reconnect;
        self
    }

    /// Cap credential refreshes per call and per stream connection. Without
    /// a cap, a call keeps refreshing and resending until the refresh action
    /// fails or the caller cancels.
    pub fn max_refreshes(mut self, max_refreshes: u32) -> Self {
        self.config.max_refreshes = Some(max_refreshes);
        self
    }

    pub fn build(self) -> Result<Client, NetworkError> {
        let resolver = self.resolver.ok_or_else(|| {
            NetworkError::Configuration("an address resolver is required".into())
        })?;
        let transport: Arc<dyn Transport> = match (self.transport, self.http_client) {
            (Some(transport), _) => transport,
            (None, Some(http)) => Arc::new(ReqwestTransport::new(http)),
            (None, None) => Arc::new(ReqwestTransport::with_defaults()?),
        };

        let chain = if self.http_debug {
            let mut chain = InterceptorChain::new()
                .with_adapter(Arc::new(LoggingInterceptor))
                .with_observer(Arc::new(LoggingInterceptor));
            chain.extend(self.chain);
            chain
        } else {
            self.chain
        };

        let executor = Arc::new(RequestExecutor::new(
            transport,
            resolver,
            self.assembler,
            chain,
            self.auth_expired.unwrap_or_else(unauthorized_predicate),
            self.fixtures,
            self.config.request_timeout,
        ));
        let coordinator = TokenRefreshCoordinator::new(self.refresher);
        let retrying = RetryingExecutor::new(
            Arc::clone(&executor),
            coordinator.clone(),
            self.config.retry_policy.clone(),
        )
        .with_max_refreshes(self.config.max_refreshes);
        let streams = StreamSession::new(
            executor,
            coordinator,
            self.config.stream_timeout,
            self.config.auto_reconnect,
        )
        .with_max_refreshes(self.config.max_refreshes);

        Ok(Client {
            inner: Arc::new(ClientInner {
                retrying,
                streams,
                config: self.config,
            }),
        })
    }
}
