//! Shared helpers for integration tests: a scripted in-memory transport and
//! small builders for SSE bodies.
#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::header::HeaderMap;

use callwire::execution::http::{Transport, TransportError};
use callwire::types::{ByteStream, HttpRequest, HttpResponse, StreamResponse};

pub type Responder =
    Arc<dyn Fn(&HttpRequest, u32) -> Result<HttpResponse, TransportError> + Send + Sync>;
pub type StreamResponder =
    Arc<dyn Fn(&HttpRequest, u32) -> Result<StreamResponse, TransportError> + Send + Sync>;

struct Inner {
    responder: Responder,
    stream_responder: StreamResponder,
    latency: Duration,
    calls: AtomicU32,
    stream_calls: AtomicU32,
    requests: Mutex<Vec<HttpRequest>>,
    call_times: Mutex<Vec<tokio::time::Instant>>,
}

/// Transport answering from closures. `n` passed to a responder is the
/// 1-based index of the call.
#[derive(Clone)]
pub struct ScriptedTransport {
    inner: Arc<Inner>,
}

impl ScriptedTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest, u32) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        Self::build(
            Arc::new(responder),
            Arc::new(|_, _| Err(TransportError::Connect("no stream scripted".into()))),
            Duration::ZERO,
        )
    }

    pub fn streaming<F>(responder: F) -> Self
    where
        F: Fn(&HttpRequest, u32) -> Result<StreamResponse, TransportError> + Send + Sync + 'static,
    {
        Self::build(
            Arc::new(|_, _| Err(TransportError::Connect("no response scripted".into()))),
            Arc::new(responder),
            Duration::ZERO,
        )
    }

    /// Always answer with `status` and `body`.
    pub fn fixed(status: u16, body: &'static str) -> Self {
        Self::new(move |_, _| Ok(HttpResponse::new(status, body)))
    }

    /// Sleep this long before answering each call.
    pub fn with_latency(self, latency: Duration) -> Self {
        Self::build(
            self.inner.responder.clone(),
            self.inner.stream_responder.clone(),
            latency,
        )
    }

    fn build(responder: Responder, stream_responder: StreamResponder, latency: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                responder,
                stream_responder,
                latency,
                calls: AtomicU32::new(0),
                stream_calls: AtomicU32::new(0),
                requests: Mutex::new(Vec::new()),
                call_times: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn calls(&self) -> u32 {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> u32 {
        self.inner.stream_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    /// Gaps between consecutive calls.
    pub fn gaps(&self) -> Vec<Duration> {
        let times = self.inner.call_times.lock().unwrap();
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    fn record(&self, request: &HttpRequest) {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.inner
            .call_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let n = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(&request);
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        (self.inner.responder)(&request, n)
    }

    async fn open_stream(
        &self,
        request: HttpRequest,
        _timeout: Duration,
    ) -> Result<StreamResponse, TransportError> {
        let n = self.inner.stream_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.record(&request);
        if !self.inner.latency.is_zero() {
            tokio::time::sleep(self.inner.latency).await;
        }
        (self.inner.stream_responder)(&request, n)
    }
}

/// Resolver mapping every domain key to one base URL.
pub fn resolver() -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
    |_: &str| Some("https://api.test".to_string())
}

pub fn bearer(request: &HttpRequest) -> Option<String> {
    request.header("authorization").map(str::to_string)
}

/// Body made of `frames` (each a complete SSE frame) that ends afterwards.
pub fn sse_body(frames: &[&str]) -> ByteStream {
    let chunks: Vec<Result<Bytes, TransportError>> = frames
        .iter()
        .map(|f| Ok(Bytes::from(f.to_string())))
        .collect();
    futures_util::stream::iter(chunks).boxed()
}

/// Body made of `frames` that then stays open without sending anything.
pub fn sse_body_then_idle(frames: &[&str]) -> ByteStream {
    let chunks: Vec<Result<Bytes, TransportError>> = frames
        .iter()
        .map(|f| Ok(Bytes::from(f.to_string())))
        .collect();
    futures_util::stream::iter(chunks)
        .chain(futures_util::stream::pending())
        .boxed()
}

pub fn stream_response(status: u16, body: ByteStream) -> StreamResponse {
    StreamResponse {
        status,
        headers: HeaderMap::new(),
        body,
    }
}
