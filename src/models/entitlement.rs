// SPDX-License-Identifier: MIT

//! Entitlement tokens and the per-user entitlement set.
//!
//! Entitlements are the capability flags a purchase unlocks. They are an
//! enum rather than raw strings so adding a product is a compile-time
//! checked change, but they serialize as the snake_case tokens the rest
//! of the site keys on (`ios_premium` etc.).

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// One purchasable content track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entitlement {
    /// iOS course track
    IosPremium,
    /// Android course track
    AndroidPremium,
    /// Both tracks (bundle purchase)
    BundlePremium,
}

impl Entitlement {
    /// The wire token for this entitlement.
    pub fn as_str(&self) -> &'static str {
        match self {
            Entitlement::IosPremium => "ios_premium",
            Entitlement::AndroidPremium => "android_premium",
            Entitlement::BundlePremium => "bundle_premium",
        }
    }
}

impl fmt::Display for Entitlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Entitlement {
    type Err = UnknownEntitlement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios_premium" => Ok(Entitlement::IosPremium),
            "android_premium" => Ok(Entitlement::AndroidPremium),
            "bundle_premium" => Ok(Entitlement::BundlePremium),
            _ => Err(UnknownEntitlement(s.to_string())),
        }
    }
}

/// Error for a token string that names no known entitlement.
#[derive(Debug, thiserror::Error)]
#[error("Unknown entitlement token: {0}")]
pub struct UnknownEntitlement(pub String);

/// A user's entitlements.
///
/// Backed by a `BTreeSet`, so duplicates are impossible and the
/// serialized order is stable. Serializes as a plain JSON array of
/// tokens, matching the `entitlements` field on the profile document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitlementSet(BTreeSet<Entitlement>);

impl EntitlementSet {
    /// Empty set (the state of a profile that has bought nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Union one entitlement into the set.
    ///
    /// Idempotent: granting a token already held changes nothing.
    /// Returns `true` if the set actually grew (callers may skip the
    /// write-back on redelivered events).
    pub fn grant(&mut self, entitlement: Entitlement) -> bool {
        self.0.insert(entitlement)
    }

    /// Remove one entitlement. Returns `true` if it was held.
    pub fn revoke(&mut self, entitlement: Entitlement) -> bool {
        self.0.remove(&entitlement)
    }

    /// Remove every entitlement (subscription cancellation).
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Pure membership test: does this set unlock the given track?
    pub fn has_access(&self, entitlement: Entitlement) -> bool {
        self.0.contains(&entitlement)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Entitlement> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Entitlement> for EntitlementSet {
    fn from_iter<I: IntoIterator<Item = Entitlement>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Access check against a possibly-unresolved entitlement set.
///
/// `None` means the caller has not finished loading the profile (or there
/// is no authenticated user); that state always denies, so premium
/// content never flashes while entitlements are still in flight.
pub fn has_access(entitlements: Option<&EntitlementSet>, entitlement: Entitlement) -> bool {
    entitlements.is_some_and(|set| set.has_access(entitlement))
}
