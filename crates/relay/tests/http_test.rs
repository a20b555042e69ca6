use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use relay::config::RelayConfig;
use relay::http::{self, NDJSON_CONTENT_TYPE};
use relay::{Host, HostBuilder};
use relay_core::protocol::Message;
use relay_core::storage::StoreConfig;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tower::ServiceExt;

async fn memory_host() -> Host {
    let config = RelayConfig {
        store: StoreConfig::Memory,
        ..Default::default()
    };
    HostBuilder::new(config).build().await.unwrap()
}

async fn host() -> (Host, Router) {
    let host = memory_host().await;
    let app = http::router(host.app_state());
    (host, app)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(resp: axum::response::Response) -> Value {
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_ok() {
    let (host, app) = host().await;

    let resp = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    host.shutdown().await;
}

#[tokio::test]
async fn workflows_are_listed_by_title() {
    let (host, app) = host().await;

    let resp = app.oneshot(get("/workflows")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;

    let slugs: Vec<&str> = body["workflows"]
        .as_array()
        .unwrap()
        .iter()
        .map(|w| w["slug"].as_str().unwrap())
        .collect();
    assert_eq!(
        slugs,
        vec![
            "ask-name",
            "newsletter-signup",
            "process-files",
            "process-refund",
            "survey-demo"
        ]
    );

    host.shutdown().await;
}

#[tokio::test]
async fn call_response_round_trip() {
    let (host, app) = host().await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/run", json!({"workflow": "ask-name"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let started = json_body(resp).await;

    assert_eq!(started["status"], json!("awaiting_input"));
    assert_eq!(started["interaction"]["type"], json!("input_request"));
    assert_eq!(started["interaction"]["id"], json!("relay-input-1"));
    assert_eq!(started["messages"].as_array().unwrap().len(), 2);

    let run_id = started["run_id"].as_str().unwrap().to_string();
    let resp = app
        .oneshot(post_json(
            &format!("/api/run/{run_id}/respond"),
            json!({"event": "relay-input-1", "data": {"input": "Ada"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let finished = json_body(resp).await;

    assert_eq!(finished["status"], json!("complete"));
    assert_eq!(finished["interaction"], Value::Null);
    assert_eq!(
        finished["messages"],
        json!([
            {"type": "log", "id": "relay-output-2", "text": "Nice to meet you, Ada!"},
            {"type": "workflow_complete", "id": "relay-workflow-complete"}
        ])
    );

    host.shutdown().await;
}

#[tokio::test]
async fn run_accepts_workflow_title() {
    let (host, app) = host().await;

    let resp = app
        .oneshot(post_json("/api/run", json!({"workflow": "Ask Name"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    host.shutdown().await;
}

#[tokio::test]
async fn unknown_workflow_is_not_found() {
    let (host, app) = host().await;

    let resp = app
        .oneshot(post_json("/api/run", json!({"workflow": "does-not-exist"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = json_body(resp).await;
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    host.shutdown().await;
}

#[tokio::test]
async fn stream_replays_full_run_as_ndjson() {
    let (host, app) = host().await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/run", json!({"workflow": "ask-name"})))
        .await
        .unwrap();
    let run_id = json_body(resp).await["run_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .clone()
        .oneshot(post_json(
            &format!("/workflows/{run_id}/event/relay-input-1"),
            json!({"value": {"input": "Grace"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(json_body(resp).await, json!({"success": true}));

    let resp = app
        .oneshot(get(&format!("/workflows/{run_id}/stream")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        NDJSON_CONTENT_TYPE
    );
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-cache");

    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let messages: Vec<Message> = String::from_utf8(body.to_vec())
        .unwrap()
        .lines()
        .map(|line| Message::parse_ndjson_line(line).unwrap())
        .collect();

    let ids: Vec<&str> = messages.iter().map(Message::id).collect();
    assert_eq!(
        ids,
        vec![
            "relay-output-0",
            "relay-input-1",
            "relay-input-1",
            "relay-output-2",
            "relay-workflow-complete"
        ]
    );

    host.shutdown().await;
}

#[tokio::test]
async fn stream_for_unknown_run_is_not_found() {
    let (host, app) = host().await;

    let resp = app
        .clone()
        .oneshot(get(
            "/workflows/00000000-0000-4000-8000-000000000000/stream",
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.oneshot(get("/workflows/not-a-uuid/stream")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    host.shutdown().await;
}

#[tokio::test]
async fn malformed_answer_is_bad_request() {
    let (host, app) = host().await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/run", json!({"workflow": "ask-name"})))
        .await
        .unwrap();
    let run_id = json_body(resp).await["run_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .oneshot(post_json(
            &format!("/api/run/{run_id}/respond"),
            json!({"event": "relay-input-1", "data": "Ada"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    host.shutdown().await;
}

#[tokio::test]
async fn start_workflow_returns_run_id() {
    let (host, app) = host().await;

    let resp = app
        .oneshot(post_json("/workflows", json!({"name": "process-files"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = json_body(resp).await;
    assert_eq!(body["name"], json!("process-files"));

    let run_id = body["id"].as_str().unwrap().parse().unwrap();
    assert!(host.runner.coordinator().run_exists(run_id).await.unwrap());

    host.shutdown().await;
}

#[tokio::test]
async fn server_stops_while_a_stream_is_open() {
    let host = memory_host().await;
    let started = host.runner.start_and_wait("ask-name", None).await.unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(host.serve(listener, async move {
        let _ = stop_rx.await;
    }));

    let mut conn = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET /workflows/{}/stream HTTP/1.1\r\nHost: localhost\r\n\r\n",
        started.run_id
    );
    conn.write_all(request.as_bytes()).await.unwrap();

    let mut buf = vec![0u8; 4096];
    let n = conn.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server must stop with a live stream attached")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn answer_to_another_event_is_conflict() {
    let (host, app) = host().await;

    let resp = app
        .clone()
        .oneshot(post_json("/api/run", json!({"workflow": "ask-name"})))
        .await
        .unwrap();
    let run_id = json_body(resp).await["run_id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .oneshot(post_json(
            &format!("/api/run/{run_id}/respond"),
            json!({"event": "relay-input-99", "data": {"input": "Ada"}}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    host.shutdown().await;
}
