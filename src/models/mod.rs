//! Data models.

pub mod entitlement;
pub mod profile;

pub use entitlement::{Entitlement, EntitlementSet};
pub use profile::UserProfile;
