//! End-to-end tests for the webhook server: routing, status codes and the
//! batches that reach the sink.

use std::sync::Arc;
use std::time::Duration;

use telemetry_receivers::config::WebhookConfig;
use telemetry_receivers::sink::MemorySink;
use telemetry_receivers::webhook::{AttributeNaming, WebhookServer};
use telemetry_receivers::TaskHandle;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

async fn start(naming: AttributeNaming, sink: Arc<MemorySink>) -> (String, TaskHandle) {
    start_with(
        WebhookConfig {
            attribute_naming: naming,
            ..Default::default()
        },
        sink,
    )
    .await
}

async fn start_with(config: WebhookConfig, sink: Arc<MemorySink>) -> (String, TaskHandle) {
    let settings = WebhookConfig {
        endpoint: "127.0.0.1:0".into(),
        ..config
    }
    .validate()
    .expect("valid settings");
    let server = WebhookServer::bind(settings, sink).await.expect("bind");
    let addr = server.local_addr().expect("addr");
    (format!("http://{addr}"), server.start())
}

// -- Accepted events -------------------------------------------------------

#[tokio::test]
async fn post_lines_become_one_batch() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/events?param1=hello&param2=world&empty="))
        .header("x-github-event", "push")
        .body("first line\nsecond: line\n\nfourth")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["records"], 4);

    let logs = sink.logs();
    assert_eq!(logs.len(), 1);
    let batch = &logs[0];
    let bodies: Vec<&str> = batch.records.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(bodies, ["first line", "second: line", "", "fourth"]);

    let attrs = &batch.resource.attributes;
    assert_eq!(attrs.get("param1"), Some("hello"));
    assert_eq!(attrs.get("param2"), Some("world"));
    assert_eq!(attrs.get("empty"), None);
    assert_eq!(attrs.get("X-Github-Event"), Some("push"));
    assert_eq!(attrs.get("Host"), None);
    assert_eq!(batch.scope.attributes.get("source"), Some("webhookevent"));

    handle.shutdown().await;
}

#[tokio::test]
async fn prefixed_naming_reaches_sink() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Prefixed, sink.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/events?source=ci"))
        .header("x-request-id", "abc")
        .body("event")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let attrs = &sink.logs()[0].resource.attributes;
    assert_eq!(attrs.get("query.source"), Some("ci"));
    assert_eq!(attrs.get("header.X-Request-Id"), Some("abc"));
    handle.shutdown().await;
}

#[tokio::test]
async fn invalid_utf8_only_affects_its_line() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/events"))
        .body(b"good line\ncaf\xe9\nanother good line\n".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let logs = sink.logs();
    assert_eq!(logs.len(), 1);
    let bodies: Vec<&str> = logs[0].records.iter().map(|r| r.body.as_str()).collect();
    assert_eq!(bodies, ["good line", "caf\u{FFFD}", "another good line"]);
    handle.shutdown().await;
}

#[tokio::test]
async fn empty_body_is_accepted_without_delivery() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/events"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    assert!(sink.logs().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn concurrent_requests_get_independent_batches() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;
    let client = reqwest::Client::new();

    let mut tasks = Vec::new();
    for i in 0..8 {
        let client = client.clone();
        let url = format!("{base}/events?n={i}");
        tasks.push(tokio::spawn(async move {
            client
                .post(url)
                .body(format!("{i}-a\n{i}-b"))
                .send()
                .await
                .unwrap()
                .status()
                .as_u16()
        }));
    }
    for t in tasks {
        assert_eq!(t.await.unwrap(), 200);
    }

    let logs = sink.logs();
    assert_eq!(logs.len(), 8);
    for batch in &logs {
        let n = batch.resource.attributes.get("n").unwrap();
        assert_eq!(batch.records[0].body, format!("{n}-a"));
        assert_eq!(batch.records[1].body, format!("{n}-b"));
    }
    handle.shutdown().await;
}

// -- Error responses -------------------------------------------------------

#[tokio::test]
async fn sink_failure_is_service_unavailable() {
    let sink = Arc::new(MemorySink::rejecting("pipeline full"));
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("{base}/events"))
        .body("event")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 503);
    handle.shutdown().await;
}

#[tokio::test]
async fn routing_status_codes() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}/health_check")).send().await.unwrap();
    assert_eq!(health.status().as_u16(), 200);

    let wrong_path = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(wrong_path.status().as_u16(), 404);

    let wrong_method = client.get(format!("{base}/events")).send().await.unwrap();
    assert_eq!(wrong_method.status().as_u16(), 405);

    assert!(sink.logs().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn chunked_body_requires_length() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;
    let addr = base.trim_start_matches("http://").to_string();

    let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(
            b"POST /events HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n",
        )
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 411"), "response: {response}");
    handle.shutdown().await;
}

#[tokio::test]
async fn over_long_line_is_payload_too_large() {
    let sink = Arc::new(MemorySink::new());
    let config = WebhookConfig {
        max_line_bytes: 64,
        ..Default::default()
    };
    let (base, handle) = start_with(config, sink.clone()).await;
    let addr = base.trim_start_matches("http://").to_string();

    let line = "x".repeat(200);
    let request = format!(
        "POST /events HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\nok\n{line}",
        line.len() + 3
    );
    let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    assert!(response.starts_with("HTTP/1.1 413"), "response: {response}");
    assert!(sink.logs().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn stalled_body_times_out() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink.clone()).await;
    let addr = base.trim_start_matches("http://").to_string();

    let mut stream = tokio::net::TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"POST /events HTTP/1.1\r\nHost: x\r\nContent-Length: 100\r\n\r\npartial\n")
        .await
        .unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .expect("server answers before the test deadline")
        .unwrap();
    assert!(response.starts_with("HTTP/1.1 408"), "response: {response}");
    assert!(sink.logs().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn stopped_server_refuses_connections() {
    let sink = Arc::new(MemorySink::new());
    let (base, handle) = start(AttributeNaming::Flat, sink).await;
    handle.shutdown().await;

    let result = reqwest::Client::new()
        .post(format!("{base}/events"))
        .body("x")
        .timeout(Duration::from_secs(2))
        .send()
        .await;
    assert!(result.is_err());
}
