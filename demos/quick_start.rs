//! Quick Start
//!
//! This demo shows how to:
//! - Register domains per environment and build a client
//! - Attach a bearer token and a single-flight refresh action
//! - Make a typed call, a mocked call and a call with its own retry policy
//!
//! It runs offline against mock data. Set `CALLWIRE_BASE_URL` to send the
//! live call to a real server, and `RUST_LOG=callwire=debug` to see the
//! request pipeline.

use std::sync::Arc;
use std::time::Duration;

use callwire::prelude::*;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize)]
struct Profile {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("callwire quick start\n====================\n");

    let base = std::env::var("CALLWIRE_BASE_URL").ok();
    let registry = DomainRegistry::new(Environment::Production).with_domain(
        "user",
        [(
            Environment::Production,
            base.clone().unwrap_or_else(|| "https://api.example.com".to_string()),
        )],
    );

    let store = CredentialStore::with_token(std::env::var("CALLWIRE_TOKEN").unwrap_or_default());
    let client = Client::builder()
        .resolver(registry)
        .adapter(Arc::new(BearerTokenAdapter::new(store.clone())))
        .refresh_with({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move {
                    // A real app would call its auth server here.
                    store.set("refreshed-token");
                    Ok(())
                }
            }
        })
        .fixtures(StaticFixtures::new().with("profile", r#"{"id":1,"name":"Offline Ada"}"#))
        .retry_policy(RetryPolicy::exponential(3, 2.0, Duration::from_secs(30)))
        .http_debug(true)
        .build()?;

    // Mocked: answered from the fixture, the network is never touched.
    let mocked = RequestDescriptor::get("user", "/me")
        .requires_auth(true)
        .with_mock_fixture("profile");
    let profile: Profile = client.execute(&mocked).await?;
    println!("mocked profile: #{} {}", profile.id, profile.name);

    // Inline mock payload with a per-call retry policy.
    let inline = RequestDescriptor::get("user", "/settings")
        .with_retry_policy(RetryPolicy::fixed(1, Duration::from_millis(250)))
        .with_mock_response(r#"{"theme":"dark"}"#);
    let settings: serde_json::Value = client.execute(&inline).await?;
    println!("mocked settings: {settings}");

    if base.is_none() {
        println!("\nSet CALLWIRE_BASE_URL to make a live call.");
        return Ok(());
    }

    let live = RequestDescriptor::get("user", "/me").requires_auth(true);
    match client.execute::<serde_json::Value>(&live).await {
        Ok(value) => println!("live response: {value}"),
        Err(e) => println!("live call failed: {e}"),
    }
    println!("refreshes so far: {}", client.coordinator().refresh_count());

    Ok(())
}
