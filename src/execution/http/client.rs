//! `reqwest`-backed transport.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};

use super::transport::{Transport, TransportError};
use crate::defaults;
use crate::error::NetworkError;
use crate::types::{HttpRequest, HttpResponse, StreamResponse};

/// Default [`Transport`] built on a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a custom HTTP client
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Create a transport with the crate's default client settings.
    pub fn with_defaults() -> Result<Self, NetworkError> {
        let http = reqwest::Client::builder()
            .connect_timeout(defaults::http::CONNECT_TIMEOUT)
            .user_agent(defaults::http::USER_AGENT)
            .build()
            .map_err(|e| NetworkError::Configuration(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::new(http))
    }

    fn request_builder(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, TransportError> {
        let HttpRequest {
            method,
            url,
            mut headers,
            body,
            multipart,
        } = request;
        if let Some(form) = multipart {
            // The form sets its own boundary content type.
            headers.remove(reqwest::header::CONTENT_TYPE);
            let form = form
                .to_reqwest_form()
                .map_err(|e| TransportError::Io(format!("invalid multipart form: {e}")))?;
            return Ok(self.http.request(method, url).headers(headers).multipart(form));
        }
        let mut rb = self.http.request(method, url).headers(headers);
        if !body.is_empty() {
            rb = rb.body(body);
        }
        Ok(rb)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        let resp = self
            .request_builder(request)?
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes().await.map_err(map_reqwest_error)?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn open_stream(
        &self,
        request: HttpRequest,
        timeout: Duration,
    ) -> Result<StreamResponse, TransportError> {
        // A reqwest timeout would also cover the body; bound the handshake only.
        let resp = tokio::time::timeout(timeout, self.request_builder(request)?.send())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let body = resp.bytes_stream().map_err(map_reqwest_error).boxed();
        Ok(StreamResponse {
            status,
            headers,
            body,
        })
    }
}
