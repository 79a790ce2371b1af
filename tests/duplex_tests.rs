//! Tests for the duplex channel — mock transport determinism, close
//! semantics, WebSocket URL mapping.

use serde_json::json;
use std::time::Duration;
use voxlink::duplex::{open_duplex, ws_url, DuplexTransport};
use voxlink::sse::StreamEvent;

// ---------------------------------------------------------------------------
// Mock transport schedule
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_mock_emits_exact_schedule_in_order() {
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");

    let mut events: Vec<StreamEvent> = Vec::new();
    for _ in 0..3 {
        events.push(channel.next_event().await.expect("scheduled event"));
    }

    assert_eq!(events[0].event, "transcript.partial");
    assert_eq!(events[0].data, json!({"text": "hello "}));
    assert_eq!(events[1].event, "transcript.partial");
    assert_eq!(events[1].data, json!({"text": "hello world"}));
    assert_eq!(events[2].event, "transcript.final");
    assert_eq!(events[2].data, json!({"text": "hello world (final)"}));

    // Schedule exhausted: the channel terminates.
    assert!(channel.next_event().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mock_close_at_open_suppresses_everything() {
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");
    channel.close();

    // Wait well past the last scheduled emission.
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(channel.next_event().await.is_none());
    assert!(channel.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_mock_close_mid_schedule_keeps_fired_drops_pending() {
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");

    let first = channel.next_event().await.expect("first emission");
    assert_eq!(first.data, json!({"text": "hello "}));

    channel.close();
    tokio::time::sleep(Duration::from_millis(2_000)).await;
    assert!(channel.next_event().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mock_close_is_idempotent() {
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");
    channel.close();
    channel.close();
    assert!(channel.next_event().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_mock_ignores_outbound_frames() {
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");
    channel.send(vec![0u8; 1024]);
    channel.send(vec![1u8; 1024]);

    // Sends have no effect on the schedule.
    let first = channel.next_event().await.expect("first emission");
    assert_eq!(first.event, "transcript.partial");
    channel.close();
}

#[tokio::test(start_paused = true)]
async fn test_mock_emission_times() {
    let start = tokio::time::Instant::now();
    let mut channel = open_duplex(DuplexTransport::Mock, "http://unused", "/unused")
        .await
        .expect("mock open");

    channel.next_event().await.expect("partial 1");
    let first = start.elapsed();
    assert!(first >= Duration::from_millis(200) && first < Duration::from_millis(500));
    channel.next_event().await.expect("partial 2");
    let second = start.elapsed();
    assert!(second >= Duration::from_millis(500) && second < Duration::from_millis(1_200));
    channel.next_event().await.expect("final");
    assert!(start.elapsed() >= Duration::from_millis(1_200));
}

// ---------------------------------------------------------------------------
// WebSocket URL mapping
// ---------------------------------------------------------------------------

#[test]
fn test_ws_url_http_maps_to_ws() {
    assert_eq!(
        ws_url("http://localhost:8080", "/v1/transcribe/ws").unwrap(),
        "ws://localhost:8080/v1/transcribe/ws"
    );
}

#[test]
fn test_ws_url_https_maps_to_wss() {
    assert_eq!(
        ws_url("https://orch.example:8443", "/v1/transcribe/ws").unwrap(),
        "wss://orch.example:8443/v1/transcribe/ws"
    );
}

#[test]
fn test_ws_url_missing_scheme_rejected() {
    assert!(ws_url("localhost:8080", "/ws").is_err());
}
