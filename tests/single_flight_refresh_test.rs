//! Credential refresh coordination across concurrent calls.

mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use callwire::prelude::*;
use callwire::types::HttpResponse;
use callwire::{RefreshFailure, TokenRefreshCoordinator};
use support::{ScriptedTransport, bearer, resolver};
use tokio::sync::Notify;

/// 200 for `Bearer fresh`, 401 for anything else.
fn token_checking_transport() -> ScriptedTransport {
    ScriptedTransport::new(|req, _| {
        if bearer(req).as_deref() == Some("Bearer fresh") {
            Ok(HttpResponse::new(200, r#"{"ok":true}"#))
        } else {
            Ok(HttpResponse::new(401, "token expired"))
        }
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_auth_expiry_refreshes_once() {
    let store = CredentialStore::with_token("stale");
    let refreshes = Arc::new(AtomicU32::new(0));
    let transport = token_checking_transport();

    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .adapter(Arc::new(BearerTokenAdapter::new(store.clone())))
        .refresh_with({
            let store = store.clone();
            let refreshes = refreshes.clone();
            move || {
                let store = store.clone();
                let refreshes = refreshes.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    store.set("fresh");
                    Ok(())
                }
            }
        })
        .build()
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let desc = RequestDescriptor::get("user", format!("/items/{i}")).requires_auth(true);
            client.execute::<serde_json::Value>(&desc).await
        }));
    }

    for task in tasks {
        let value = task.await.unwrap().expect("call succeeds after refresh");
        assert_eq!(value["ok"], true);
    }
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(client.coordinator().refresh_count(), 1);
    assert_eq!(client.coordinator().epoch(), 1);
    assert!(!client.coordinator().is_refreshing());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn refresh_failure_reaches_every_waiter() {
    let client = Client::builder()
        .transport(token_checking_transport())
        .resolver(resolver())
        .refresh_with(|| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Err(NetworkError::refresh_failed("auth server down"))
        })
        .build()
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let desc = RequestDescriptor::get("user", "/me").requires_auth(true);
            client.execute::<serde_json::Value>(&desc).await
        }));
    }

    let all = tokio::time::timeout(Duration::from_secs(5), futures_util::future::join_all(tasks))
        .await
        .expect("no waiter hangs");
    for result in all {
        let err = result.unwrap().unwrap_err();
        assert_eq!(err, NetworkError::refresh_failed("auth server down"));
    }
    assert!(!client.coordinator().is_refreshing());
    assert_eq!(client.coordinator().waiter_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_waiter_leaves_refresh_and_others_untouched() {
    let gate = Arc::new(Notify::new());
    let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn({
        let gate = gate.clone();
        move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(())
            }
        }
    })));

    let cancel_a = CancelHandle::new();
    let a = tokio::spawn({
        let coordinator = coordinator.clone();
        let cancel = cancel_a.clone();
        async move { coordinator.ensure_fresh_credential(&cancel).await }
    });
    let b = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.ensure_fresh_credential(&CancelHandle::new()).await }
    });

    while coordinator.waiter_count() < 2 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(coordinator.is_refreshing());

    cancel_a.cancel();
    assert_eq!(a.await.unwrap(), Err(NetworkError::Cancelled));
    assert_eq!(coordinator.waiter_count(), 1);
    assert!(coordinator.is_refreshing());

    gate.notify_one();
    assert_eq!(b.await.unwrap(), Ok(()));
    assert_eq!(coordinator.refresh_count(), 1);
    assert_eq!(coordinator.epoch(), 1);
}

#[tokio::test]
async fn dropped_waiter_is_removed_from_the_queue() {
    let gate = Arc::new(Notify::new());
    let coordinator = TokenRefreshCoordinator::new(Some(refresh_fn({
        let gate = gate.clone();
        move || {
            let gate = gate.clone();
            async move {
                gate.notified().await;
                Ok(())
            }
        }
    })));

    let waiting = tokio::time::timeout(
        Duration::from_millis(20),
        coordinator.ensure_fresh_credential(&CancelHandle::new()),
    )
    .await;
    assert!(waiting.is_err());
    assert_eq!(coordinator.waiter_count(), 0);
    assert!(coordinator.is_refreshing());

    gate.notify_one();
    while coordinator.is_refreshing() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(coordinator.epoch(), 1);
}

#[tokio::test]
async fn requires_auth_false_never_refreshes() {
    let refreshes = Arc::new(AtomicU32::new(0));
    let transport = ScriptedTransport::fixed(401, "token expired");
    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .no_retry()
        .refresh_with({
            let refreshes = refreshes.clone();
            move || {
                let refreshes = refreshes.clone();
                async move {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }
        })
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("user", "/public").requires_auth(false);
    let err = client.execute::<serde_json::Value>(&desc).await.unwrap_err();

    assert_eq!(err.status_code(), Some(401));
    assert!(matches!(err, NetworkError::TransientFailure(_)));
    assert_eq!(refreshes.load(Ordering::SeqCst), 0);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn missing_refresh_action_is_fatal() {
    let transport = ScriptedTransport::fixed(401, "token expired");
    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("user", "/me").requires_auth(true);
    let err = client.execute::<serde_json::Value>(&desc).await.unwrap_err();

    assert_eq!(
        err,
        NetworkError::CredentialRefreshFailed(RefreshFailure::NotConfigured)
    );
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn repeated_rejection_keeps_refreshing_until_accepted() {
    let transport = ScriptedTransport::new(|_, n| {
        if n <= 4 {
            Ok(HttpResponse::new(401, "still expired"))
        } else {
            Ok(HttpResponse::new(200, r#"{"ok":true}"#))
        }
    });
    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .no_retry()
        .refresh_with(|| async { Ok(()) })
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("user", "/me").requires_auth(true);
    let value: serde_json::Value = client.execute(&desc).await.unwrap();

    assert_eq!(value["ok"], true);
    assert_eq!(transport.calls(), 5);
    assert_eq!(client.coordinator().refresh_count(), 4);
}

#[tokio::test]
async fn configured_refresh_cap_ends_persistent_rejection() {
    let transport = ScriptedTransport::fixed(401, "still expired");
    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .max_refreshes(3)
        .refresh_with(|| async { Ok(()) })
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("user", "/me").requires_auth(true);
    let err = client.execute::<serde_json::Value>(&desc).await.unwrap_err();

    assert!(err.is_refresh_failure());
    assert_eq!(client.coordinator().refresh_count(), 3);
    assert_eq!(transport.calls(), 4);
}

#[tokio::test]
async fn custom_predicate_detects_expiry_from_body() {
    let store = CredentialStore::with_token("stale");
    let transport = ScriptedTransport::new(|req, _| {
        if bearer(req).as_deref() == Some("Bearer fresh") {
            Ok(HttpResponse::new(200, "[]"))
        } else {
            Ok(HttpResponse::new(403, r#"{"code":"TOKEN_EXPIRED"}"#))
        }
    });
    let client = Client::builder()
        .transport(transport.clone())
        .resolver(resolver())
        .adapter(Arc::new(BearerTokenAdapter::new(store.clone())))
        .auth_expiry_predicate(|status, body| {
            status == 403 && String::from_utf8_lossy(body).contains("TOKEN_EXPIRED")
        })
        .refresh_with({
            let store = store.clone();
            move || {
                let store = store.clone();
                async move {
                    store.set("fresh");
                    Ok(())
                }
            }
        })
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("user", "/orders").requires_auth(true);
    let orders: Vec<serde_json::Value> = client.execute(&desc).await.unwrap();
    assert!(orders.is_empty());
    assert_eq!(transport.calls(), 2);
}
