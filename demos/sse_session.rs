//! SSE Session
//!
//! Opens a long-lived event stream and prints every callback for a while
//! (`CALLWIRE_RUN_SECS`, default 60), then disconnects.
//! Auth expiry on the stream goes through the same refresh coordinator as
//! plain calls; other failures are redialed per `AutoReconnect`.
//!
//! ```bash
//! CALLWIRE_BASE_URL=http://localhost:8080 cargo run --example sse_session
//! ```

use std::sync::Arc;
use std::time::Duration;

use callwire::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callwire=debug")),
        )
        .init();

    let base = match std::env::var("CALLWIRE_BASE_URL") {
        Ok(v) if !v.is_empty() => v,
        _ => {
            eprintln!("Set CALLWIRE_BASE_URL to a server exposing GET /events as text/event-stream.");
            return Ok(());
        }
    };

    let client = Client::builder()
        .resolver(move |_: &str| -> Option<String> { Some(base.clone()) })
        .auto_reconnect(
            AutoReconnect::default()
                .with_max_retry_count(5)
                .with_retry_delay(Duration::from_secs(2)),
        )
        .stream_timeout(Duration::from_secs(60))
        .build()?;

    let (handler, mut rx) = ChannelEventHandler::new();
    let handle = client.connect_stream(
        StreamRequest::new("push", "/events").requires_auth(false),
        Arc::new(handler),
    );

    let run_for = std::env::var("CALLWIRE_RUN_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(60);
    let deadline = tokio::time::sleep(Duration::from_secs(run_for));
    tokio::pin!(deadline);

    let mut states = handle.state_changes();
    loop {
        tokio::select! {
            note = rx.recv() => match note {
                Some(StreamNotification::Event(event)) => {
                    println!("[{}] {}: {}", event.received_at.format("%H:%M:%S"), event.event, event.data);
                }
                Some(StreamNotification::Connectivity(up)) => println!("connectivity: {up}"),
                Some(StreamNotification::Error(e)) => println!("error: {e}"),
                None => break,
            },
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("state: {}", *states.borrow_and_update());
            }
            _ = &mut deadline => {
                handle.disconnect();
                break;
            }
        }
    }

    handle.closed().await;
    println!("session closed");
    Ok(())
}
