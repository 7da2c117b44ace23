//! Structural fingerprint of an event set.
//!
//! The summary cache is keyed by a stable hash of the sorted
//! `(id, updated_at)` pairs across all events: any create, update, or
//! delete produces a different fingerprint, so a cached summary can never
//! outlive the data it was computed from.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A first-class cache key derived from an event set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint an event set. Order-insensitive: the pairs are sorted
    /// by id before hashing.
    pub fn of_events(events: &[Event]) -> Self {
        let mut pairs: Vec<(&str, i64)> = events
            .iter()
            .map(|e| (e.id.as_str(), e.updated_at.timestamp_millis()))
            .collect();
        pairs.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        for (id, updated_at) in pairs {
            hasher.update(id.as_bytes());
            hasher.update(&[0u8]);
            hasher.update(&updated_at.to_le_bytes());
        }
        Self(hasher.finalize().to_hex().to_string())
    }

    /// The hex digest.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
