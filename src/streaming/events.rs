//! Event-stream value types and handlers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;

use crate::error::NetworkError;
use crate::types::{AutoReconnect, RequestDescriptor};

/// Connection state of a [`StreamSession`](super::StreamSession).
///
/// `Disconnected -> Connecting -> Connected -> Reconnecting -> Connecting | Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for StreamConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub id: Option<String>,
    /// Event name; `message` when the server did not send one.
    pub event: String,
    pub data: String,
    /// Reconnection time requested by the server.
    pub retry: Option<Duration>,
    pub received_at: DateTime<Utc>,
}

impl SseEvent {
    /// Decode `data` as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        serde_json::from_str(&self.data).map_err(|e| {
            NetworkError::TransientFailure(crate::error::FailureCause::Decode(e.to_string()))
        })
    }
}

impl From<eventsource_stream::Event> for SseEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        Self {
            id: (!event.id.is_empty()).then_some(event.id),
            event: if event.event.is_empty() {
                "message".to_string()
            } else {
                event.event
            },
            data: event.data,
            retry: event.retry,
            received_at: Utc::now(),
        }
    }
}

/// Receives stream callbacks. Called from the session's task, so
/// implementations should return quickly.
pub trait StreamEventHandler: Send + Sync {
    fn on_event(&self, event: SseEvent);

    /// `true` once the first event of a connection arrives, `false` after
    /// every failed connection attempt.
    fn on_connectivity_changed(&self, _connected: bool) {}

    fn on_error(&self, _error: &NetworkError) {}
}

/// Everything a [`ChannelEventHandler`] forwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamNotification {
    Event(SseEvent),
    Connectivity(bool),
    Error(NetworkError),
}

/// Forwards callbacks into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<StreamNotification>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StreamNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StreamEventHandler for ChannelEventHandler {
    fn on_event(&self, event: SseEvent) {
        let _ = self.tx.send(StreamNotification::Event(event));
    }

    fn on_connectivity_changed(&self, connected: bool) {
        let _ = self.tx.send(StreamNotification::Connectivity(connected));
    }

    fn on_error(&self, error: &NetworkError) {
        let _ = self.tx.send(StreamNotification::Error(error.clone()));
    }
}

/// A request for a long-lived event stream.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub descriptor: RequestDescriptor,
    /// Overrides the client's reconnect behavior.
    pub reconnect: Option<AutoReconnect>,
}

impl StreamRequest {
    /// `GET` with auth required and event-stream headers.
    pub fn new(domain_key: impl Into<String>, path: impl Into<String>) -> Self {
        Self::from_descriptor(RequestDescriptor::get(domain_key, path).requires_auth(true))
    }

    /// Wrap an existing descriptor, adding event-stream headers it lacks.
    /// Mocking is not available for streams.
    pub fn from_descriptor(mut descriptor: RequestDescriptor) -> Self {
        for (name, value) in [("accept", "text/event-stream"), ("cache-control", "no-cache")] {
            if !descriptor
                .headers
                .keys()
                .any(|k| k.eq_ignore_ascii_case(name))
            {
                descriptor.headers.insert(name.to_string(), value.to_string());
            }
        }
        descriptor.flags.use_mock = false;
        descriptor.mock = None;
        Self {
            descriptor,
            reconnect: None,
        }
    }

    pub fn with_method(mut self, method: reqwest::Method) -> Self {
        self.descriptor.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.with_header(name, value);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor = self.descriptor.with_query(name, value);
        self
    }

    /// JSON body; sets `Content-Type: application/json` unless already present.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, NetworkError> {
        self.descriptor = self.descriptor.with_json(value)?;
        Ok(self)
    }

    pub fn requires_auth(mut self, requires_auth: bool) -> Self {
        self.descriptor.flags.requires_auth = requires_auth;
        self
    }

    /// Handshake and idle timeout; defaults to the client's stream timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.descriptor.timeout = Some(timeout);
        self
    }

    pub fn with_reconnect(mut self, reconnect: AutoReconnect) -> Self {
        self.reconnect = Some(reconnect);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_request_defaults() {
        let req = StreamRequest::new("push", "/events");
        let desc = &req.descriptor;
        assert_eq!(desc.method, reqwest::Method::GET);
        assert!(desc.flags.requires_auth);
        assert!(!desc.flags.use_mock);
        assert_eq!(desc.headers.get("accept").unwrap(), "text/event-stream");
        assert_eq!(desc.headers.get("cache-control").unwrap(), "no-cache");
        assert!(req.reconnect.is_none());
    }

    #[test]
    fn explicit_accept_header_is_kept() {
        let desc = RequestDescriptor::post("push", "/events")
            .with_header("Accept", "text/event-stream; charset=utf-8")
            .with_mock_response("ignored");
        let req = StreamRequest::from_descriptor(desc)
            .with_json(&serde_json::json!({"topic": "orders"}))
            .unwrap();
        let desc = &req.descriptor;
        assert_eq!(
            desc.headers.get("Accept").unwrap(),
            "text/event-stream; charset=utf-8"
        );
        assert!(!desc.headers.contains_key("accept"));
        assert_eq!(desc.headers.get("content-type").unwrap(), "application/json");
        assert!(desc.mock.is_none() && !desc.flags.use_mock);
    }

    #[test]
    fn event_defaults_to_message() {
        let raw = eventsource_stream::Event {
            event: String::new(),
            data: r#"{"n":1}"#.to_string(),
            id: String::new(),
            retry: None,
        };
        let event = SseEvent::from(raw);
        assert_eq!(event.event, "message");
        assert_eq!(event.id, None);
        let value: serde_json::Value = event.json().unwrap();
        assert_eq!(value["n"], 1);
    }
}
