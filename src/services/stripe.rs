// SPDX-License-Identifier: MIT

//! Stripe webhook verification and wire types.
//!
//! Signature verification follows Stripe's scheme: the `Stripe-Signature`
//! header carries `t=<timestamp>,v1=<hex hmac>`, and the HMAC-SHA256 is
//! computed over `"{timestamp}.{raw body}"`. Verification must run over
//! the raw request bytes; re-serializing the JSON first would break the
//! signature.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Maximum allowed age for webhook events (5 minutes).
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Maximum allowed clock skew for future-dated events (1 minute).
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// How long a seen event id stays in the replay cache.
const PROCESSED_EVENT_TTL_SECS: i64 = 24 * 60 * 60;

/// Webhook verification and parsing errors. All of them map to a 400 at
/// the handler boundary; none of them touch the database.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Event timestamp too old")]
    TimestampTooOld,

    #[error("Event timestamp in the future")]
    TimestampInFuture,

    #[error("Malformed webhook payload: {0}")]
    Parse(String),
}

// ─── Signature Verification ──────────────────────────────────────

/// Parsed components of the `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp the signature was generated at
    pub timestamp: i64,
    /// v1 signature bytes (HMAC-SHA256)
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parse a `t=<timestamp>,v1=<hex>` header. Unknown fields (v0, future
    /// schemes) are ignored for forward compatibility.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| WebhookError::Parse("invalid signature header".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(
                        value
                            .parse()
                            .map_err(|_| WebhookError::Parse("invalid timestamp".to_string()))?,
                    );
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|_| {
                        WebhookError::Parse("invalid v1 signature hex".to_string())
                    })?);
                }
                _ => {}
            }
        }

        Ok(SignatureHeader {
            timestamp: timestamp
                .ok_or_else(|| WebhookError::Parse("missing timestamp".to_string()))?,
            v1_signature: v1_signature
                .ok_or_else(|| WebhookError::Parse("missing v1 signature".to_string()))?,
        })
    }
}

/// Verifier for Stripe webhook signatures.
pub struct StripeWebhookVerifier {
    secret: String,
}

impl StripeWebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify the signature over the raw payload and parse the event.
    ///
    /// Fails closed: any header, timestamp, signature, or JSON problem
    /// rejects the whole request before the payload is trusted.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        self.validate_timestamp(header.timestamp)?;

        let expected = self.compute_signature(header.timestamp, payload);
        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(WebhookError::InvalidSignature);
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::Parse(e.to_string()))
    }

    /// Reject events outside the replay window.
    fn validate_timestamp(&self, timestamp: i64) -> Result<(), WebhookError> {
        let age = chrono::Utc::now().timestamp() - timestamp;

        if age > MAX_EVENT_AGE_SECS {
            return Err(WebhookError::TimestampTooOld);
        }
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(WebhookError::TimestampInFuture);
        }
        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Constant-time comparison so signature checks leak no timing information.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Compute a valid header value for test fixtures.
pub fn sign_test_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

// ─── Wire Types ──────────────────────────────────────────────────

/// Stripe webhook event envelope, reduced to the fields we process.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    /// Event id (evt_...), the idempotency key for redeliveries
    pub id: String,
    /// Event type string, e.g. "checkout.session.completed"
    #[serde(rename = "type")]
    pub event_type: String,
    /// Creation time (Unix timestamp)
    pub created: i64,
    pub data: StripeEventData,
    /// Live mode vs test mode
    #[serde(default)]
    pub livemode: bool,
}

/// Container for the event's polymorphic object.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// Deserialize the data object as the type the event carries.
    pub fn deserialize_object<T: serde::de::DeserializeOwned>(
        &self,
    ) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.data.object.clone())
    }
}

/// Event types with handler paths. Everything else is acknowledged and
/// dropped, so Stripe never retries events we do not care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripeEventType {
    CheckoutSessionCompleted,
    CustomerSubscriptionDeleted,
    Unhandled,
}

impl StripeEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "customer.subscription.deleted" => Self::CustomerSubscriptionDeleted,
            _ => Self::Unhandled,
        }
    }
}

/// Checkout session object from a `checkout.session.completed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// User id the site attached when creating the session
    pub client_reference_id: Option<String>,
    /// Stripe customer id (cus_...)
    pub customer: Option<String>,
    /// Buyer email as collected by checkout
    pub customer_details: Option<CustomerDetails>,
    /// Session metadata; carries `price_id` and may repeat `user_id`
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

impl CheckoutSession {
    /// The stable user id for this purchase: session metadata first, then
    /// `client_reference_id`. Email is never used as a lookup key.
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("user_id")
            .map(String::as_str)
            .or(self.client_reference_id.as_deref())
    }

    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
    }

    /// The purchased price id, as attached in session metadata.
    pub fn price_id(&self) -> Option<&str> {
        self.metadata.get("price_id").map(String::as_str)
    }
}

/// Subscription object from a `customer.subscription.deleted` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    /// Stripe customer id the subscription belonged to
    pub customer: String,
}

// ─── Replay Cache ────────────────────────────────────────────────

/// Short-TTL cache of processed webhook event ids.
///
/// Stripe delivers at-least-once; set-union grants are already idempotent,
/// but a cache hit lets a redelivery return 200 without touching the
/// database at all. Per-instance only, which is fine: a miss merely costs
/// one redundant idempotent write.
#[derive(Clone, Default)]
pub struct ProcessedEventCache {
    seen: Arc<dashmap::DashMap<String, i64>>,
}

impl ProcessedEventCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Has this event id already been fully processed?
    pub fn is_duplicate(&self, event_id: &str) -> bool {
        match self.seen.get(event_id) {
            Some(seen_at) => {
                chrono::Utc::now().timestamp() - *seen_at < PROCESSED_EVENT_TTL_SECS
            }
            None => false,
        }
    }

    /// Record an event id after its side effects have landed. Marking only
    /// on success keeps Stripe's retries effective when a grant hits a
    /// transient database error. Expired entries are pruned on insert.
    pub fn mark_processed(&self, event_id: &str) {
        let now = chrono::Utc::now().timestamp();
        self.seen
            .retain(|_, seen_at| now - *seen_at < PROCESSED_EVENT_TTL_SECS);
        self.seen.insert(event_id.to_string(), now);
    }
}
