// SPDX-License-Identifier: MIT

//! Stripe webhook endpoint.
//!
//! The only writer of entitlements. State machine per delivery:
//! received -> signature-verified -> dispatched -> (grant | revoke) ->
//! acknowledged, or received -> signature-invalid -> rejected(400).

use crate::error::{AppError, Result};
use crate::models::UserProfile;
use crate::services::stripe::{
    CheckoutSession, StripeEvent, StripeEventType, StripeSubscription, StripeWebhookVerifier,
};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/stripe/webhook", post(handle_event))
}

/// Acknowledgement body Stripe expects on success.
#[derive(Serialize)]
struct WebhookAck {
    received: bool,
}

fn ack() -> Json<WebhookAck> {
    Json(WebhookAck { received: true })
}

/// Handle an incoming webhook delivery (POST).
///
/// The body is taken as raw bytes: the signature covers the exact bytes
/// Stripe sent, so it must be verified before any JSON parsing is trusted.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::WebhookSignature("missing Stripe-Signature header".to_string()))?;

    // Fails closed: nothing below runs unless the signature checks out.
    let verifier = StripeWebhookVerifier::new(&state.config.stripe_webhook_secret);
    let event = verifier.verify_and_parse(&body, signature)?;

    // Stripe delivers at-least-once; a fully-processed event id needs no
    // second pass.
    if state.processed_events.is_duplicate(&event.id) {
        tracing::info!(event_id = %event.id, "Duplicate webhook delivery, skipping");
        return Ok(ack());
    }

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        livemode = event.livemode,
        "Webhook event verified"
    );

    match StripeEventType::parse(&event.event_type) {
        StripeEventType::CheckoutSessionCompleted => {
            handle_checkout_completed(&state, &event).await?;
        }
        StripeEventType::CustomerSubscriptionDeleted => {
            handle_subscription_deleted(&state, &event).await;
        }
        StripeEventType::Unhandled => {
            // Acknowledged with no side effect: returning non-2xx here
            // would put Stripe into a retry storm over events we ignore.
            tracing::debug!(
                event_type = %event.event_type,
                "Ignoring unhandled event type"
            );
        }
    }

    state.processed_events.mark_processed(&event.id);
    Ok(ack())
}

/// Grant path: resolve the purchased price to an entitlement and union it
/// into the buyer's profile.
async fn handle_checkout_completed(state: &AppState, event: &StripeEvent) -> Result<()> {
    let session: CheckoutSession = event
        .deserialize_object()
        .map_err(|e| AppError::BadRequest(format!("malformed checkout session: {}", e)))?;

    // Do not guess identity: a checkout without a user id or email is a
    // checkout we cannot attribute, and must bounce as malformed.
    let user_id = session
        .user_id()
        .ok_or_else(|| AppError::BadRequest("checkout session missing user id".to_string()))?
        .to_string();
    let email = session
        .email()
        .ok_or_else(|| AppError::BadRequest("checkout session missing customer email".to_string()))?
        .to_string();

    let Some(entitlement) = state.config.resolve_price(session.price_id()) else {
        // A price missing from the mapping is a config gap, not a retryable
        // failure. Acknowledge so Stripe stops redelivering, and log loudly
        // so the gap gets fixed and the grant replayed by hand.
        tracing::error!(
            event_id = %event.id,
            session_id = %session.id,
            price_id = ?session.price_id(),
            "No entitlement mapped for price id, acknowledging without grant"
        );
        return Ok(());
    };

    // Read the persisted profile immediately before writing back, so two
    // racing deliveries serialize on the document update. A profile that
    // does not exist yet is a first purchase beating the first login.
    let mut profile = match state.db.get_profile(&user_id).await? {
        Some(profile) => profile,
        None => {
            tracing::info!(user_id = %user_id, "No profile yet, creating on first purchase");
            UserProfile::new(user_id.clone(), Some(email.clone()))
        }
    };

    let newly_granted = profile.entitlements.grant(entitlement);
    if profile.email.is_none() {
        profile.email = Some(email);
    }
    if let Some(customer) = session.customer.as_deref() {
        profile.stripe_customer_id = Some(customer.to_string());
    }
    profile.updated_at = chrono::Utc::now().to_rfc3339();

    // Write even when the grant was a no-op so the customer link still
    // lands on redelivered or repeated purchases.
    state.db.upsert_profile(&profile).await?;

    tracing::info!(
        event_id = %event.id,
        user_id = %profile.user_id,
        entitlement = %entitlement,
        newly_granted,
        "Entitlement granted"
    );
    Ok(())
}

/// Revoke path: clear entitlements for the profile linked to the cancelled
/// subscription's customer.
///
/// Never fails the request: there is nothing actionable in a Stripe retry
/// here, so read and write errors are logged and the event acknowledged.
async fn handle_subscription_deleted(state: &AppState, event: &StripeEvent) {
    let subscription: StripeSubscription = match event.deserialize_object() {
        Ok(sub) => sub,
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Malformed subscription object");
            return;
        }
    };

    let profile = match state
        .db
        .find_profile_by_customer_id(&subscription.customer)
        .await
    {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            // Legitimately unmatched customer (e.g. a subscription created
            // before this system existed). Already handled as far as we
            // are concerned.
            tracing::info!(
                event_id = %event.id,
                customer_id = %subscription.customer,
                "No profile for cancelled subscription's customer"
            );
            return;
        }
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "Profile lookup failed during cancellation");
            return;
        }
    };

    let mut entitlements = profile.entitlements.clone();
    entitlements.clear();

    if let Err(e) = state.db.set_entitlements(&profile.user_id, &entitlements).await {
        tracing::error!(
            event_id = %event.id,
            user_id = %profile.user_id,
            error = %e,
            "Failed to clear entitlements on cancellation"
        );
    } else {
        tracing::info!(
            event_id = %event.id,
            user_id = %profile.user_id,
            subscription_id = %subscription.id,
            "Entitlements cleared on subscription cancellation"
        );
    }
}
