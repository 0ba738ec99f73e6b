//! End-to-end calls over the default reqwest transport against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use callwire::prelude::*;
use callwire::upload::UploadResponse;
use serde::Deserialize;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> ClientBuilder {
    let uri = server.uri();
    Client::builder().resolver(move |_: &str| -> Option<String> { Some(uri.clone()) })
}

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: u64,
    name: String,
}

#[tokio::test]
async fn decodes_json_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/7"))
        .and(query_param("fields", "name"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 7,
            "name": "Ada"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).build().unwrap();
    let desc = RequestDescriptor::get("user", "/users/7").with_query("fields", "name");
    let response = client
        .execute_response::<User>(&desc, &CancelHandle::new())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(
        response.value,
        User {
            id: 7,
            name: "Ada".into()
        }
    );
}

#[tokio::test]
async fn posts_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .and(header("content-type", "application/json"))
        .and(body_string_contains("\"name\":\"Grace\""))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 8,
            "name": "Grace"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).build().unwrap();
    let desc = RequestDescriptor::post("user", "/users")
        .with_json(&serde_json::json!({ "name": "Grace" }))
        .unwrap();
    let user: User = client.execute(&desc).await.unwrap();
    assert_eq!(user.id, 8);
}

#[tokio::test]
async fn retries_server_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[1,2,3]"))
        .with_priority(5)
        .mount(&server)
        .await;

    let client = client_for(&server)
        .retry_policy(RetryPolicy::fixed(3, Duration::from_millis(10)))
        .build()
        .unwrap();
    let values: Vec<u32> = client
        .execute(&RequestDescriptor::get("user", "/flaky"))
        .await
        .unwrap();

    assert_eq!(values, vec![1, 2, 3]);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn refreshes_expired_token_over_http() {
    let server = MockServer::start().await;
    Mock::given(path("/me"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": 1, "name": "me" })),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .with_priority(5)
        .mount(&server)
        .await;

    let store = CredentialStore::with_token("stale");
    let client = client_for(&server)
        .adapter(Arc::new(BearerTokenAdapter::new(store.clone())))
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

    let me: User = client
        .execute(&RequestDescriptor::get("user", "/me").requires_auth(true))
        .await
        .unwrap();

    assert_eq!(me.name, "me");
    assert_eq!(client.coordinator().refresh_count(), 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn streams_events_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/events"))
        .and(header("accept", "text/event-stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "event: greeting\ndata: hello\n\ndata: {\"n\":2}\n\n",
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server)
        .auto_reconnect(AutoReconnect::disabled())
        .build()
        .unwrap();
    let (handler, mut rx) = ChannelEventHandler::new();
    let handle = client.connect_stream(
        StreamRequest::new("push", "/events").requires_auth(false),
        Arc::new(handler),
    );

    tokio::time::timeout(Duration::from_secs(10), handle.closed())
        .await
        .expect("finite body ends the session");

    let mut events = Vec::new();
    while let Ok(note) = rx.try_recv() {
        if let StreamNotification::Event(e) = note {
            events.push(e);
        }
    }
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event, "greeting");
    assert_eq!(events[0].data, "hello");
    assert_eq!(events[1].json::<serde_json::Value>().unwrap()["n"], 2);
}

#[tokio::test]
async fn downloads_to_a_file() {
    let server = MockServer::start().await;
    Mock::given(path("/files/report.csv"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a,b\n1,2\n".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("reports/latest.csv");
    let client = client_for(&server).build().unwrap();
    let done = client
        .download(
            DownloadRequest::new("cdn", "/files/report.csv")
                .to(DownloadDestination::Custom(target.clone())),
            &CancelHandle::new(),
        )
        .await
        .unwrap();

    assert_eq!(done.local_path, target);
    assert_eq!(done.total_bytes_received, 8);
    assert_eq!(done.total_bytes_expected, 8);
    assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");
}

#[tokio::test]
async fn uploads_multipart_forms() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(body_string_contains("name=\"album\""))
        .and(body_string_contains("filename=\"t.csv\""))
        .and(body_string_contains("Content-Type: text/csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id": "u1" })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).build().unwrap();
    let request = UploadRequest::new("media", "/upload")
        .with_field("album", "summer")
        .with_file(UploadFile::file("a,b", "t.csv"));
    let uploaded: UploadResponse<serde_json::Value> =
        client.upload(request, &CancelHandle::new()).await.unwrap();

    assert_eq!(uploaded.response.value["id"], "u1");
    assert!(uploaded.total_bytes_sent > 0);

    let received = server.received_requests().await.unwrap();
    let content_type = received[0]
        .headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    assert_eq!(received[0].headers.get_all("content-type").iter().count(), 1);
}

#[tokio::test]
async fn malformed_part_content_type_never_reaches_the_server() {
    let server = MockServer::start().await;
    let client = client_for(&server).build().unwrap();
    let request = UploadRequest::new("media", "/upload").with_file(
        UploadFile::file("a,b", "t.csv").with_mime_type("text/csv\r\nX-Injected: 1"),
    );

    let err = client
        .upload::<serde_json::Value>(request, &CancelHandle::new())
        .await
        .unwrap_err();

    assert!(matches!(err, NetworkError::Configuration(_)));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn connection_refused_is_a_transient_failure() {
    let client = Client::builder()
        .resolver(|_: &str| -> Option<String> { Some("http://127.0.0.1:9".to_string()) })
        .no_retry()
        .build()
        .unwrap();

    let err = client
        .execute::<serde_json::Value>(&RequestDescriptor::get("user", "/me"))
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::TransientFailure(_)));
}
