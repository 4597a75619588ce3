// SPDX-License-Identifier: MIT

//! Integration tests for Stripe webhook handling.
//!
//! These run against the offline mock database: everything up to the
//! first Firestore call is exercised for real, and paths that do reach
//! the database assert the retryable-500 contract. Full grant round
//! trips live in firestore_integration.rs.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use fluttertonative_api::services::stripe::sign_test_payload;
use serde_json::json;
use tower::ServiceExt;

mod common;

/// Webhook secret matching Config::test_default().
const TEST_SECRET: &str = "whsec_test_secret";

fn event_body(id: &str, event_type: &str, object: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": id,
        "type": event_type,
        "created": chrono::Utc::now().timestamp(),
        "data": { "object": object },
        "livemode": false
    }))
    .unwrap()
}

fn signed_request(body: &[u8]) -> Request<Body> {
    let header = sign_test_payload(TEST_SECRET, chrono::Utc::now().timestamp(), body);
    Request::builder()
        .method("POST")
        .uri("/stripe/webhook")
        .header("content-type", "application/json")
        .header("stripe-signature", header)
        .body(Body::from(body.to_vec()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_unhandled_event_acknowledged_without_side_effect() {
    let (app, _) = common::create_test_app();

    // invoice.payment_succeeded is verified but not handled; it must be
    // acknowledged so Stripe does not retry. The mock DB would error on
    // any access, so a 200 also proves nothing touched it.
    let body = event_body("evt_unhandled", "invoice.payment_succeeded", json!({}));
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}

#[tokio::test]
async fn test_missing_signature_header_rejected() {
    let (app, _) = common::create_test_app();

    let body = event_body("evt_nosig", "checkout.session.completed", json!({}));
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stripe/webhook")
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_signature");
}

#[tokio::test]
async fn test_wrong_signature_rejected() {
    let (app, _) = common::create_test_app();

    let body = event_body("evt_badsig", "checkout.session.completed", json!({}));
    // Well-formed header, signed with the wrong secret
    let header = sign_test_payload("whsec_wrong", chrono::Utc::now().timestamp(), &body);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stripe/webhook")
                .header("stripe-signature", header)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let (app, _) = common::create_test_app();

    let body = event_body("evt_tamper", "checkout.session.completed", json!({}));
    let header = sign_test_payload(TEST_SECRET, chrono::Utc::now().timestamp(), &body);

    let mut tampered = body.clone();
    let last = tampered.len() - 5;
    tampered[last] ^= 1;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stripe/webhook")
                .header("stripe-signature", header)
                .body(Body::from(tampered))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let (app, _) = common::create_test_app();

    let body = event_body("evt_stale", "checkout.session.completed", json!({}));
    // Signed correctly, but ten minutes ago
    let header = sign_test_payload(TEST_SECRET, chrono::Utc::now().timestamp() - 600, &body);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/stripe/webhook")
                .header("stripe-signature", header)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_missing_user_id_rejected() {
    let (app, _) = common::create_test_app();

    // Valid signature, but no client_reference_id or metadata user id:
    // the purchase cannot be attributed and must bounce as malformed.
    let body = event_body(
        "evt_nouser",
        "checkout.session.completed",
        json!({
            "id": "cs_1",
            "customer": "cus_1",
            "customer_details": { "email": "reader@example.com" },
            "metadata": { "price_id": "price_android_premium" }
        }),
    );
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn test_checkout_missing_email_rejected() {
    let (app, _) = common::create_test_app();

    let body = event_body(
        "evt_nomail",
        "checkout.session.completed",
        json!({
            "id": "cs_2",
            "client_reference_id": "u1",
            "metadata": { "price_id": "price_android_premium" }
        }),
    );
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_unknown_price_acknowledged_without_grant() {
    let (app, _) = common::create_test_app();

    // An unmapped price id is a config gap, not a retryable error: the
    // event is acknowledged and no grant happens (the offline DB would
    // have errored if the handler tried to write one).
    let body = event_body(
        "evt_unmapped",
        "checkout.session.completed",
        json!({
            "id": "cs_3",
            "client_reference_id": "u1",
            "customer_details": { "email": "reader@example.com" },
            "metadata": { "price_id": "price_not_in_mapping" }
        }),
    );
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}

#[tokio::test]
async fn test_checkout_db_failure_returns_500_for_retry() {
    let (app, _) = common::create_test_app();

    // Fully valid grant against the offline mock: the profile fetch
    // fails, and Stripe must get a 500 so it redelivers.
    let body = event_body(
        "evt_dbdown",
        "checkout.session.completed",
        json!({
            "id": "cs_4",
            "client_reference_id": "u1",
            "customer": "cus_1",
            "customer_details": { "email": "reader@example.com" },
            "metadata": { "price_id": "price_android_premium" }
        }),
    );
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "database_error");
}

#[tokio::test]
async fn test_subscription_deleted_db_failure_still_acknowledged() {
    let (app, _) = common::create_test_app();

    // The cancellation path swallows persistence errors: Stripe has no
    // actionable retry, so even with the DB offline this is a 200.
    let body = event_body(
        "evt_cancel",
        "customer.subscription.deleted",
        json!({
            "id": "sub_1",
            "customer": "cus_gone"
        }),
    );
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}

#[tokio::test]
async fn test_duplicate_delivery_short_circuits() {
    let (app, _) = common::create_test_app();

    let body = event_body("evt_replay", "invoice.payment_succeeded", json!({}));

    let first = app.clone().oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // Same event id again: served from the processed-event cache.
    let second = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(body_json(second).await["received"], true);
}

#[tokio::test]
async fn test_failed_event_is_not_marked_processed() {
    let (app, state) = common::create_test_app();

    // The grant 500s against the offline mock; the event id must stay
    // out of the replay cache so Stripe's retry gets processed for real.
    let body = event_body(
        "evt_retryable",
        "checkout.session.completed",
        json!({
            "id": "cs_5",
            "client_reference_id": "u1",
            "customer_details": { "email": "reader@example.com" },
            "metadata": { "price_id": "price_ios_premium" }
        }),
    );

    let first = app.clone().oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!state.processed_events.is_duplicate("evt_retryable"));

    // Retry hits the handler again (and fails the same way here).
    let retry = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(retry.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
