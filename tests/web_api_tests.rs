//! Integration tests for the web API.
//!
//! These tests drive the operator endpoints against the fixture layout.

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use rs_ctc::hal::MockClock;
use rs_ctc::services::{build_router, ApiResponse, RequestOutcome, SharedPanel, WebServerConfig};
use rs_ctc::{LayoutDocument, Packet};

const LAYOUT: &str = include_str!("fixtures/layout.json");

fn create_test_app() -> (axum::Router, Arc<SharedPanel<MockClock>>) {
    let dispatcher = LayoutDocument::from_json(LAYOUT)
        .unwrap()
        .build(MockClock::new())
        .unwrap();
    let panel = Arc::new(SharedPanel::new(dispatcher));
    let config = WebServerConfig::default();
    let router = build_router(Arc::clone(&panel), &config);
    (router, panel)
}

async fn post(app: axum::Router, uri: &str) -> (StatusCode, ApiResponse<RequestOutcome>) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_get_state() {
    let (app, _panel) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["layout_name"], "Test Division");
    assert_eq!(data["blocks"].as_array().unwrap().len(), 9);
    assert_eq!(data["control_points"][0]["name"], "CP1");
    assert_eq!(data["control_points"][0]["lining"]["single"], "none");
    assert_eq!(data["labels"][1]["text"], "Crossover");
}

#[tokio::test]
async fn test_line_route() {
    let (app, panel) = create_test_app();

    let (status, json) = post(app, "/api/signals/CP1_P/line").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.success);
    assert_eq!(json.data, Some(RequestOutcome::accepted()));

    // The route command goes out on the next tick
    let sent = panel.tick();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dest, 0x50);
    assert_eq!(sent[0].cmd, b'L');
}

#[tokio::test]
async fn test_line_route_refused_when_occupied() {
    let (app, panel) = create_test_app();
    panel.enqueue(Packet::new(0xFF, 0x50, b'S', vec![0x04 | 0x08]));
    panel.tick();

    let (status, json) = post(app, "/api/signals/CP1_P/line").await;
    assert_eq!(status, StatusCode::OK);

    let outcome = json.data.unwrap();
    assert!(!outcome.accepted);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("the interlocking is occupied or under manual control")
    );
    assert!(panel.tick().is_empty());
}

#[tokio::test]
async fn test_clear_route_without_route() {
    let (app, _panel) = create_test_app();

    let (_, json) = post(app, "/api/signals/CP1_P/clear").await;
    let outcome = json.data.unwrap();
    assert!(!outcome.accepted);
    assert_eq!(outcome.reason.as_deref(), Some("no route is lined"));
}

#[tokio::test]
async fn test_clear_route_after_lining() {
    let (app, panel) = create_test_app();
    panel.enqueue(Packet::new(0xFF, 0x50, b'S', vec![0x02 | 0x08]));
    panel.tick();

    let (_, json) = post(app, "/api/signals/CP1_P/clear").await;
    assert_eq!(json.data, Some(RequestOutcome::accepted()));

    let sent = panel.tick();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cmd, b'C');
}

#[tokio::test]
async fn test_unknown_signal() {
    let (app, _panel) = create_test_app();

    let (_, json) = post(app, "/api/signals/NOPE/line").await;
    let outcome = json.data.unwrap();
    assert!(!outcome.accepted);
    assert!(outcome.reason.unwrap().contains("NOPE"));
}

#[tokio::test]
async fn test_throw_switch() {
    let (app, panel) = create_test_app();

    let (_, json) = post(app, "/api/switches/SW1/throw").await;
    assert_eq!(json.data, Some(RequestOutcome::accepted()));

    let sent = panel.tick();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].dest, 0x50);
    assert_eq!(sent[0].data, vec![1, 1]);
}

#[tokio::test]
async fn test_throw_locked_switch() {
    let (app, panel) = create_test_app();
    panel.enqueue(Packet::new(0xFF, 0x50, b'S', vec![0x02 | 0x08]));
    panel.tick();

    let (_, json) = post(app, "/api/switches/SW1/throw").await;
    let outcome = json.data.unwrap();
    assert!(!outcome.accepted);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("switch is locked by its control point")
    );
}

#[tokio::test]
async fn test_not_found() {
    let (app, _panel) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/nonexistent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: ApiResponse<()> = serde_json::from_slice(&body).unwrap();
    assert!(!json.success);
    assert_eq!(json.error.as_deref(), Some("Not found"));
}
