//! Business logic services.

pub mod stripe;

pub use stripe::{ProcessedEventCache, StripeWebhookVerifier};
