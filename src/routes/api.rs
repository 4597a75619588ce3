// SPDX-License-Identifier: MIT

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::entitlement::{has_access, Entitlement, EntitlementSet};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/entitlements", get(get_entitlements))
        .route("/api/access/{entitlement}", get(check_access))
}

// ─── User Profile ────────────────────────────────────────────

/// Current user response.
#[derive(Serialize)]
pub struct MeResponse {
    pub user_id: String,
    pub email: Option<String>,
    pub entitlements: EntitlementSet,
    /// Whether a Stripe customer record is linked
    pub stripe_linked: bool,
}

/// Get current user profile.
///
/// A missing profile document is a valid state (signed up, never bought
/// anything), so it renders as an empty profile rather than a 404.
async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let profile = state.db.get_profile(&user.user_id).await?;

    Ok(Json(match profile {
        Some(profile) => MeResponse {
            user_id: profile.user_id,
            email: profile.email,
            entitlements: profile.entitlements,
            stripe_linked: profile.stripe_customer_id.is_some(),
        },
        None => MeResponse {
            user_id: user.user_id,
            email: None,
            entitlements: EntitlementSet::new(),
            stripe_linked: false,
        },
    }))
}

// ─── Entitlements ────────────────────────────────────────────

#[derive(Serialize)]
pub struct EntitlementsResponse {
    pub entitlements: EntitlementSet,
}

/// Get the current user's entitlement set.
async fn get_entitlements(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<EntitlementsResponse>> {
    let profile = state.db.get_profile(&user.user_id).await?;

    Ok(Json(EntitlementsResponse {
        entitlements: profile.map(|p| p.entitlements).unwrap_or_default(),
    }))
}

#[derive(Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
}

/// Check whether the current user may see one content track.
///
/// Denies by default: no profile means no access, and an unknown token in
/// the path is a 400 rather than a silent false.
async fn check_access(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(entitlement): Path<String>,
) -> Result<Json<AccessResponse>> {
    let entitlement: Entitlement = entitlement
        .parse()
        .map_err(|e: crate::models::entitlement::UnknownEntitlement| {
            AppError::BadRequest(e.to_string())
        })?;

    let profile = state.db.get_profile(&user.user_id).await?;
    let allowed = has_access(profile.as_ref().map(|p| &p.entitlements), entitlement);

    Ok(Json(AccessResponse { allowed }))
}
