//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and cached in memory. In production
//! Cloud Run injects them as environment variables via secret bindings,
//! so there is no Secret Manager round trip at request time.

use std::env;

use crate::models::entitlement::Entitlement;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL for CORS
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Stripe price id granting `ios_premium` (None if the product is not configured)
    pub stripe_price_ios: Option<String>,
    /// Stripe price id granting `android_premium`
    pub stripe_price_android: Option<String>,
    /// Stripe price id granting `bundle_premium`
    pub stripe_price_bundle: Option<String>,

    // --- Secrets (cached from env at startup) ---
    /// Stripe webhook signing secret (whsec_...)
    pub stripe_webhook_secret: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Fails fast on missing secrets: the server must never accept a
    /// webhook it cannot verify.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "https://fluttertonative.pro".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            stripe_price_ios: env::var("STRIPE_PRICE_IOS").ok(),
            stripe_price_android: env::var("STRIPE_PRICE_ANDROID").ok(),
            stripe_price_bundle: env::var("STRIPE_PRICE_BUNDLE").ok(),

            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRIPE_WEBHOOK_SECRET"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Look up the entitlement a Stripe price id maps to.
    ///
    /// Total: unknown or absent price ids resolve to `None` rather than
    /// falling back to a default product, so a misconfigured price never
    /// silently grants someone else's track.
    pub fn resolve_price(&self, price_id: Option<&str>) -> Option<Entitlement> {
        let price_id = price_id?;
        if self.stripe_price_ios.as_deref() == Some(price_id) {
            Some(Entitlement::IosPremium)
        } else if self.stripe_price_android.as_deref() == Some(price_id) {
            Some(Entitlement::AndroidPremium)
        } else if self.stripe_price_bundle.as_deref() == Some(price_id) {
            Some(Entitlement::BundlePremium)
        } else {
            None
        }
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            stripe_price_ios: Some("price_ios_premium".to_string()),
            stripe_price_android: Some("price_android_premium".to_string()),
            stripe_price_bundle: Some("price_bundle_premium".to_string()),
            stripe_webhook_secret: "whsec_test_secret".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
