//! Tests for `POST /api/pix/webhook/openpix`: authentication, idempotent
//! redelivery, orphan events and per-event failure isolation.

#![allow(clippy::panic)]

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use pix_checkout::security::sign_body;
use serde_json::json;

#[tokio::test]
async fn missing_or_wrong_secret_is_unauthorized() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let order_id = create_order(&app).await;
    let body = paid_webhook(order_id);

    let response = send(&app.router, webhook(&body, None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let response = send(&app.router, webhook(&body, Some("Bearer nope"))).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    assert!(app.store.webhook_events().await.is_empty());
    let Some(order) = app.store.order(order_id).await else {
        panic!("order missing");
    };
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unauthenticated_garbage_is_401_not_400() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let response = send(&app.router, webhook("{not json", None)).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authenticated_garbage_is_bad_request() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let response = send(&app.router, webhook("{not json", Some(WEBHOOK_SECRET))).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json.pointer("/error/code"), Some(&json!(1002)));
}

#[tokio::test]
async fn hmac_signature_authenticates() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let order_id = create_order(&app).await;
    let body = paid_webhook(order_id);
    let signature = sign_body(body.as_bytes(), WEBHOOK_SECRET);

    let Ok(request) = Request::builder()
        .method("POST")
        .uri("/api/pix/webhook/openpix")
        .header("content-type", "application/json")
        .header("x-hub-signature-256", format!("sha256={signature}"))
        .body(Body::from(body))
    else {
        panic!("request construction failed");
    };
    let response = send(&app.router, request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json, json!({"ok": true, "processed": 1}));
}

#[tokio::test]
async fn duplicate_deliveries_notify_once() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let order_id = create_order(&app).await;
    let body = paid_webhook(order_id);

    for _ in 0..5 {
        let ack = send(&app.router, webhook(&body, Some(WEBHOOK_SECRET))).await;
        assert_eq!(ack.status, StatusCode::OK);
        assert_eq!(ack.json.get("processed"), Some(&json!(1)));
    }

    assert_eq!(app.store.webhook_events().await.len(), 1);
    assert_eq!(app.store.tokens_for(order_id).await.len(), 1);
    assert_eq!(app.notifier.count().await, 1);

    let Some(order) = app.store.order(order_id).await else {
        panic!("order missing");
    };
    assert_eq!(order.status, OrderStatus::Paid);
}

#[tokio::test]
async fn simultaneous_duplicate_deliveries_notify_once() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let order_id = create_order(&app).await;
    let body = paid_webhook(order_id);

    let (first, second) = tokio::join!(
        send(&app.router, webhook(&body, Some(WEBHOOK_SECRET))),
        send(&app.router, webhook(&body, Some(WEBHOOK_SECRET))),
    );
    for ack in [first, second] {
        assert_eq!(ack.status, StatusCode::OK);
        assert_eq!(ack.json.get("processed"), Some(&json!(1)));
    }

    assert_eq!(app.store.webhook_events().await.len(), 1);
    assert_eq!(app.store.tokens_for(order_id).await.len(), 1);
    assert_eq!(app.notifier.count().await, 1);
}

#[tokio::test]
async fn orphan_event_is_acknowledged_and_recorded() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let body = json!({
        "event": "OPENPIX:CHARGE_COMPLETED",
        "charge": {
            "status": "COMPLETED",
            "correlationID": "unknown-correlation",
            "transactionID": "tx-orphan"
        }
    })
    .to_string();

    let ack = send(&app.router, webhook(&body, Some(WEBHOOK_SECRET))).await;
    assert_eq!(ack.status, StatusCode::OK);
    assert_eq!(ack.json.get("processed"), Some(&json!(1)));

    let events = app.store.webhook_events().await;
    let [event] = events.as_slice() else {
        panic!("one ledger row expected");
    };
    assert_eq!(event.provider_event_id, "tx-orphan");
    assert!(event.order_id.is_none());
    assert_eq!(app.notifier.count().await, 0);
}

#[tokio::test]
async fn unrecognized_shape_processes_nothing() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let ack = send(&app.router, webhook("[1, 2, 3]", Some(WEBHOOK_SECRET))).await;
    assert_eq!(ack.status, StatusCode::OK);
    assert_eq!(ack.json, json!({"ok": true, "processed": 0}));
}

#[tokio::test]
async fn failing_event_does_not_block_the_batch() {
    let store = MemoryStore::new();
    let backend = Arc::new(PoisonedLedgerStore {
        inner: store.clone(),
        poisoned_event_id: "evt-broken".to_string(),
    });
    let app = test_app_with_backend(
        FakeProvider::answering(ChargeStatus::Pending),
        store,
        backend,
    )
    .await;
    let broken = create_order(&app).await;
    let healthy = create_order(&app).await;

    let body = json!({
        "events": [
            {"eventId": "evt-broken", "status": "COMPLETED", "correlationID": broken.to_string()},
            {"eventId": "evt-ok", "status": "COMPLETED", "correlationID": healthy.to_string()}
        ]
    })
    .to_string();

    let ack = send(&app.router, webhook(&body, Some(WEBHOOK_SECRET))).await;
    assert_eq!(ack.status, StatusCode::OK);
    assert_eq!(ack.json.get("processed"), Some(&json!(1)));

    let (Some(broken), Some(healthy)) =
        (app.store.order(broken).await, app.store.order(healthy).await)
    else {
        panic!("orders missing");
    };
    assert_eq!(broken.status, OrderStatus::Pending);
    assert_eq!(healthy.status, OrderStatus::Paid);
    assert_eq!(app.notifier.count().await, 1);
}

#[tokio::test]
async fn cancel_event_then_paid_event_keeps_order_canceled() {
    let app = test_app(FakeProvider::answering(ChargeStatus::Pending)).await;
    let order_id = create_order(&app).await;

    let cancel = json!({
        "eventId": "evt-cancel",
        "event": "OPENPIX:CHARGE_EXPIRED",
        "charge": {"status": "CANCELED", "correlationID": order_id.to_string()}
    })
    .to_string();
    let ack = send(&app.router, webhook(&cancel, Some(WEBHOOK_SECRET))).await;
    assert_eq!(ack.json.get("processed"), Some(&json!(1)));

    let ack = send(
        &app.router,
        webhook(&paid_webhook(order_id), Some(WEBHOOK_SECRET)),
    )
    .await;
    assert_eq!(ack.json.get("processed"), Some(&json!(1)));

    let Some(order) = app.store.order(order_id).await else {
        panic!("order missing");
    };
    assert_eq!(order.status, OrderStatus::Canceled);
    assert_eq!(app.notifier.count().await, 0);
    assert_eq!(app.store.webhook_events().await.len(), 2);
}
