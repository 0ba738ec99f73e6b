//! callwire
//!
//! Client-side execution layer for authenticated HTTP calls and
//! server-sent event streams.
//!
//! - **Interceptors**: ordered request adapters and outcome observers.
//! - **Retries**: per-call [`RetryPolicy`] with fixed, exponential or custom backoff.
//! - **Credential refresh**: auth-expired responses trigger one shared,
//!   single-flight refresh; every affected call is resent afterwards without
//!   spending a retry.
//! - **Event streams**: [`StreamSession`] with auth recovery and auto-reconnect.
//!
//! ```rust,ignore
//! use callwire::prelude::*;
//!
//! let registry = DomainRegistry::new(Environment::Production)
//!     .with_domain("user", [(Environment::Production, "https://api.example.com")]);
//! let client = Client::builder().resolver(registry).build()?;
//! let me: serde_json::Value = client
//!     .execute(&RequestDescriptor::get("user", "/me").requires_auth(true))
//!     .await?;
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod defaults;
pub mod domain;
pub mod download;
pub mod error;
pub mod execution;
pub mod mock;
pub mod retry;
pub mod streaming;
pub mod types;
pub mod upload;
pub mod utils;

pub use auth::{
    BearerTokenAdapter, CredentialRefresher, CredentialStore, TokenRefreshCoordinator, refresh_fn,
};
pub use client::{Client, ClientBuilder};
pub use domain::{AddressResolver, DomainRegistry, Environment};
pub use error::{FailureCause, NetworkError, RefreshFailure};
pub use execution::{Outcome, RequestExecutor, RetryingExecutor};
pub use retry::{DelayStrategy, RetryCondition, RetryPolicy};
pub use streaming::{StreamHandle, StreamSession};
pub use utils::CancelHandle;

/// Commonly used types.
pub mod prelude {
    pub use crate::auth::{BearerTokenAdapter, CredentialStore, refresh_fn};
    pub use crate::client::{Client, ClientBuilder};
    pub use crate::domain::{DomainRegistry, Environment};
    pub use crate::download::{DownloadDestination, DownloadRequest};
    pub use crate::error::{FailureCause, NetworkError};
    pub use crate::execution::http::{LoggingInterceptor, RequestAdapter, ResponseObserver};
    pub use crate::mock::{DirectoryFixtures, StaticFixtures};
    pub use crate::retry::RetryPolicy;
    pub use crate::streaming::{
        ChannelEventHandler, SseEvent, StreamConnectionState, StreamNotification, StreamRequest,
    };
    pub use crate::types::{AutoReconnect, ClientConfig, RequestDescriptor};
    pub use crate::upload::{UploadFile, UploadRequest};
    pub use crate::utils::CancelHandle;
}
