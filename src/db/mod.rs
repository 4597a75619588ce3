//! Database layer (Firestore).

pub mod firestore;

pub use firestore::FirestoreDb;

/// Collection names as constants.
pub mod collections {
    /// User profiles (keyed by user id from the auth provider)
    pub const PROFILES: &str = "profiles";
}
