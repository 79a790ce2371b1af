//! Tests for the unidirectional stream client against a canned TCP server —
//! event delivery across chunk boundaries, synthetic error events,
//! cancellation.

use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use voxlink::headers::build_headers;
use voxlink::stream::open_stream;

const STREAM_HEAD: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

/// Serve exactly one connection: read the request head (and body, if the
/// head announces a Content-Length), report the request line, then write
/// `chunks` with `gap` between them and close.
async fn serve_once(
    chunks: Vec<&'static str>,
    gap: Duration,
    head: &'static str,
) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (request_tx, request_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut buf).await.expect("read request");
            if n == 0 {
                break raw.len();
            }
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head_text = String::from_utf8_lossy(&raw[..header_end]).into_owned();
        let content_length = head_text
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        while raw.len() - header_end < content_length {
            let n = socket.read(&mut buf).await.expect("read body");
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }
        let _ = request_tx.send(String::from_utf8_lossy(&raw).into_owned());

        socket.write_all(head.as_bytes()).await.expect("write head");
        for chunk in chunks {
            tokio::time::sleep(gap).await;
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
        }
    });

    (addr, request_rx)
}

#[tokio::test]
async fn test_events_delivered_in_wire_order() {
    let (addr, _req) = serve_once(
        vec![
            "event: llm.token\ndata: {\"token\":\"Hel\"}\n\n",
            "data: {\"token\":\"lo\"}\n\nevent: llm.done\ndata: {}\n\n",
        ],
        Duration::from_millis(10),
        STREAM_HEAD,
    )
    .await;

    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/v1/chat/stream", addr),
        build_headers("sid", None, None),
        None,
    );

    let first = stream.next_event().await.expect("first event");
    assert_eq!(first.event, "llm.token");
    assert_eq!(first.data, json!({"token": "Hel"}));
    let second = stream.next_event().await.expect("second event");
    assert_eq!(second.data, json!({"token": "lo"}));
    let third = stream.next_event().await.expect("done event");
    assert_eq!(third.event, "llm.done");
    // Server closed: stream terminates.
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_record_split_across_network_chunks() {
    let (addr, _req) = serve_once(
        vec!["event: llm.to", "ken\ndata: {\"tok", "en\":\"x\"}\n\n"],
        Duration::from_millis(10),
        STREAM_HEAD,
    )
    .await;

    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    let event = stream.next_event().await.expect("event");
    assert_eq!(event.event, "llm.token");
    assert_eq!(event.data, json!({"token": "x"}));
}

#[tokio::test]
async fn test_get_without_body_post_with_body() {
    let (addr, req) = serve_once(vec![], Duration::ZERO, STREAM_HEAD).await;
    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    while stream.next_event().await.is_some() {}
    let request = req.await.expect("request");
    assert!(request.starts_with("GET /s"), "got: {}", request);
    assert!(request.to_lowercase().contains("accept: text/event-stream"));
    assert!(request.to_lowercase().contains("x-session-id: sid"));
    assert!(request.to_lowercase().contains("x-request-id:"));
    assert!(request.to_lowercase().contains("x-correlation-id:"));

    let (addr, req) = serve_once(vec![], Duration::ZERO, STREAM_HEAD).await;
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        Some(json!({"query": "q", "session_id": "sid"})),
    );
    while stream.next_event().await.is_some() {}
    let request = req.await.expect("request");
    assert!(request.starts_with("POST /s"), "got: {}", request);
    assert!(request.contains("\"query\":\"q\""));
}

#[tokio::test]
async fn test_non_success_status_becomes_single_error_event() {
    let (addr, _req) = serve_once(
        vec![],
        Duration::ZERO,
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
    )
    .await;

    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    let event = stream.next_event().await.expect("error event");
    assert_eq!(event.event, "error");
    let cause = event.data.as_str().expect("string cause");
    assert!(cause.contains("503"), "got: {}", cause);
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_connect_failure_becomes_error_event() {
    // Grab a port that nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    let event = stream.next_event().await.expect("error event");
    assert_eq!(event.event, "error");
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_close_stops_event_delivery() {
    let (addr, _req) = serve_once(
        vec![
            "data: 1\n\n",
            "data: 2\n\n",
            "data: 3\n\n",
        ],
        Duration::from_millis(200),
        STREAM_HEAD,
    )
    .await;

    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    let first = stream.next_event().await.expect("first event");
    assert_eq!(first.data, json!(1));

    stream.close();
    assert!(stream.is_closed());

    // Later wire data must never surface, buffered or in flight.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(stream.next_event().await.is_none());
    assert!(stream.next_event().await.is_none());
}

#[tokio::test]
async fn test_close_is_idempotent_and_safe_after_completion() {
    let (addr, _req) = serve_once(vec!["data: 1\n\n"], Duration::ZERO, STREAM_HEAD).await;
    let client = reqwest::Client::new();
    let mut stream = open_stream(
        &client,
        format!("http://{}/s", addr),
        build_headers("sid", None, None),
        None,
    );
    while stream.next_event().await.is_some() {}
    stream.close();
    stream.close();
    assert!(stream.next_event().await.is_none());
}
