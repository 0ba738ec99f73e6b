//! Server-sent event streams
//!
//! A [`StreamSession`] dials an event stream through the client's transport
//! and adapters, parses frames with `eventsource-stream`, and keeps the
//! connection alive: auth expiry is recovered through the shared refresh
//! coordinator, other failures are redialed according to [`AutoReconnect`].
//!
//! [`AutoReconnect`]: crate::types::AutoReconnect

pub mod events;
pub mod session;

pub use events::{
    ChannelEventHandler, SseEvent, StreamConnectionState, StreamEventHandler, StreamNotification,
    StreamRequest,
};
pub use session::{StreamHandle, StreamSession};
