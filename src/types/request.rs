//! Request description types.
//!
//! A [`RequestDescriptor`] is created by the caller and only ever read by the
//! execution engine. The same descriptor is re-sent verbatim on every retry
//! and after every credential refresh.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;

use crate::error::NetworkError;
use crate::retry::RetryPolicy;
use crate::upload::MultipartForm;

/// Per-request behavior switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestFlags {
    /// Auth-expiry responses trigger a credential refresh and a resend.
    pub requires_auth: bool,
    /// Skip the transport and answer with the canned payload.
    pub use_mock: bool,
}

/// Where a mocked call takes its payload from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockSource {
    /// Bytes supplied with the request.
    Inline(Bytes),
    /// A fixture name resolved by the client's [`FixtureLoader`](crate::mock::FixtureLoader).
    Fixture(String),
}

/// Immutable description of one logical call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Opaque key resolved to a base address by the client's resolver.
    pub domain_key: String,
    pub path: String,
    pub method: Method,
    pub headers: HashMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    /// Multipart form sent instead of `body`.
    pub multipart: Option<MultipartForm>,
    pub flags: RequestFlags,
    /// Overrides the client's request timeout.
    pub timeout: Option<Duration>,
    /// Overrides the client's default retry policy.
    pub retry_policy: Option<RetryPolicy>,
    pub mock: Option<MockSource>,
}

impl RequestDescriptor {
    pub fn new(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            domain_key: domain_key.into(),
            path: path.into(),
            method: Method::GET,
            headers: HashMap::new(),
            query: BTreeMap::new(),
            body: None,
            multipart: None,
            flags: RequestFlags::default(),
            timeout: None,
            retry_policy: None,
            mock: None,
        }
    }

    pub fn get(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(domain_key, path)
    }

    pub fn post(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(domain_key, path).with_method(Method::POST)
    }

    pub fn put(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(domain_key, path).with_method(Method::PUT)
    }

    pub fn delete(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(domain_key, path).with_method(Method::DELETE)
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_multipart(mut self, form: MultipartForm) -> Self {
        self.multipart = Some(form);
        self
    }

    /// Serialize `value` as the JSON body and set `Content-Type` accordingly.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, NetworkError> {
        let body = serde_json::to_vec(value)
            .map_err(|e| NetworkError::Configuration(format!("Failed to encode JSON body: {e}")))?;
        self.body = Some(Bytes::from(body));
        if !self
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"))
        {
            self.headers
                .insert("content-type".to_string(), "application/json".to_string());
        }
        Ok(self)
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.flags.requires_auth = requires_auth;
        self
    }

    pub fn use_mock(mut self, use_mock: bool) -> Self {
        self.flags.use_mock = use_mock;
        self
    }

    /// Enable mocking with an inline payload.
    pub fn with_mock_response(mut self, payload: impl Into<Bytes>) -> Self {
        self.flags.use_mock = true;
        self.mock = Some(MockSource::Inline(payload.into()));
        self
    }

    /// Enable mocking with a named fixture.
    pub fn with_mock_fixture(mut self, name: impl Into<String>) -> Self {
        self.flags.use_mock = true;
        self.mock = Some(MockSource::Fixture(name.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}
