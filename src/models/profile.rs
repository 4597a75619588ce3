//! User profile model for storage and API.

use serde::{Deserialize, Serialize};

use crate::models::entitlement::EntitlementSet;

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable user id from the auth provider (also the document ID).
    /// The only key entitlement logic joins on; email is display-only.
    pub user_id: String,
    /// Email address (may drift between variants, never used for lookup)
    pub email: Option<String>,
    /// Purchased entitlements
    #[serde(default)]
    pub entitlements: EntitlementSet,
    /// Stripe customer id, set on first successful purchase
    pub stripe_customer_id: Option<String>,
    /// When the profile was created (ISO 8601)
    pub created_at: String,
    /// Last mutation timestamp (ISO 8601)
    pub updated_at: String,
}

impl UserProfile {
    /// Fresh profile with no entitlements, as the webhook handler creates
    /// one on a first purchase that beats the first login.
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            user_id: user_id.into(),
            email,
            entitlements: EntitlementSet::new(),
            stripe_customer_id: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
