//! Authentication helpers.
//!
//! - [`CredentialRefresher`]: the refresh action the client runs when a
//!   response signals auth expiry. It updates whatever the request adapters
//!   read the credential from; it returns nothing but success or failure.
//! - [`CredentialStore`] + [`BearerTokenAdapter`]: a ready-made place to keep
//!   a bearer token and an adapter that stamps it onto every request.
//! - [`TokenRefreshCoordinator`]: runs the refresh action single-flight.

use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::NetworkError;
use crate::execution::http::interceptor::{RequestAdapter, RequestContext};
use crate::types::HttpRequest;

pub mod coordinator;

pub use coordinator::TokenRefreshCoordinator;

/// Obtains a fresh credential.
///
/// Implementations store the new credential themselves (for example in a
/// [`CredentialStore`]); the next request adaptation picks it up.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self) -> Result<(), NetworkError>;
}

/// [`CredentialRefresher`] backed by an async closure.
pub struct FnRefresher<F>(F);

#[async_trait]
impl<F, Fut> CredentialRefresher for FnRefresher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), NetworkError>> + Send,
{
    async fn refresh(&self) -> Result<(), NetworkError> {
        (self.0)().await
    }
}

/// Wrap an async closure as a refresh action.
///
/// ```rust,ignore
/// let store = CredentialStore::new();
/// let refresher = refresh_fn({
///     let store = store.clone();
///     move || {
///         let store = store.clone();
///         async move {
///             store.set(fetch_token().await?);
///             Ok(())
///         }
///     }
/// });
/// ```
pub fn refresh_fn<F, Fut>(f: F) -> Arc<dyn CredentialRefresher>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), NetworkError>> + Send + 'static,
{
    Arc::new(FnRefresher(f))
}

/// Shared slot for a bearer token.
#[derive(Clone, Default)]
pub struct CredentialStore {
    token: Arc<RwLock<Option<SecretString>>>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("has_token", &self.has_token())
            .finish()
    }
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(token);
        store
    }

    pub fn set(&self, token: impl Into<String>) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(SecretString::from(token.into()));
    }

    pub fn clear(&self) {
        let mut slot = self.token.write().unwrap_or_else(|e| e.into_inner());
        *slot = None;
    }

    pub fn has_token(&self) -> bool {
        self.token
            .read()
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// `Bearer <token>` header value, if a token is present.
    fn bearer_header(&self) -> Result<Option<HeaderValue>, NetworkError> {
        let slot = self.token.read().unwrap_or_else(|e| e.into_inner());
        let Some(token) = slot.as_ref() else {
            return Ok(None);
        };
        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|_| NetworkError::Interceptor("bearer token is not a valid header value".into()))?;
        value.set_sensitive(true);
        Ok(Some(value))
    }
}

/// Sets `Authorization: Bearer <token>` from a [`CredentialStore`].
///
/// Requests go out unchanged while the store is empty.
#[derive(Debug, Clone)]
pub struct BearerTokenAdapter {
    store: CredentialStore,
}

impl BearerTokenAdapter {
    pub fn new(store: CredentialStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RequestAdapter for BearerTokenAdapter {
    async fn adapt(
        &self,
        _ctx: &RequestContext,
        mut request: HttpRequest,
    ) -> Result<HttpRequest, NetworkError> {
        if let Some(value) = self.store.bearer_header()? {
            request.headers.insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}
