// SPDX-License-Identifier: MIT

//! FlutterToNative API: backend for the FlutterToNative.pro course site.
//!
//! This crate provides the entitlement-gating core: Stripe webhook
//! processing that grants premium entitlements, and the authenticated
//! profile API the site reads them back from.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use config::Config;
use db::FirestoreDb;
use services::stripe::ProcessedEventCache;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: FirestoreDb,
    /// Seen webhook event ids, so redeliveries short-circuit without writes.
    pub processed_events: ProcessedEventCache,
}
