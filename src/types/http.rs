//! Wire-level values exchanged with a [`Transport`](crate::execution::http::transport::Transport).

use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};

use crate::execution::http::transport::TransportError;
use crate::upload::MultipartForm;

/// A fully assembled outgoing request, as seen by adapters and the transport.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Takes precedence over `body` when set.
    pub multipart: Option<MultipartForm>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            multipart: None,
        }
    }

    /// Header value as text, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A complete response returned by one request/response exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// `200..400`; redirects that reach this layer count as success.
    pub fn is_success(&self) -> bool {
        is_success_status(self.status)
    }

    /// Declared body length, falling back to the received length.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.body.len() as u64)
    }
}

/// Byte stream of an open event-stream connection.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// Head of a streaming response plus its body stream.
pub struct StreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// A decoded response handed back to the caller.
#[derive(Debug, Clone)]
pub struct Response<T> {
    pub value: T,
    pub status: u16,
    pub headers: HeaderMap,
}

impl<T> Response<T> {
    pub fn into_value(self) -> T {
        self.value
    }
}

pub(crate) fn is_success_status(status: u16) -> bool {
    (200..400).contains(&status)
}
