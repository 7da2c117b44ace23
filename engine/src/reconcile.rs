//! Reconciliation of a remote snapshot into the local event set.
//!
//! Pure and deterministic: given the same local events and remote documents
//! it always produces the same merged set. Conflict policy is
//! last-write-wins by `updated_at`, with one hard rule on top: a local copy
//! with an unflushed mutation wins unconditionally - a stale remote read
//! must never overwrite work the queue has not uploaded yet.

use crate::event::{Event, RemoteEvent, SyncMarker};
use crate::EventId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a reconciliation pass did, for logging and assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Remote-only documents adopted as synced local events
    pub adopted: Vec<EventId>,
    /// Local copies replaced by a later remote version
    pub overwritten: Vec<EventId>,
    /// Local copies kept over the remote version (pending or newer)
    pub kept_local: Vec<EventId>,
}

impl ReconcileOutcome {
    /// Whether the pass changed the local event set at all.
    pub fn changed(&self) -> bool {
        !self.adopted.is_empty() || !self.overwritten.is_empty()
    }
}

/// Merge a remote snapshot with the local event set.
///
/// Returns the merged set ordered descending by `(occurred_at, id)` plus
/// the outcome. Events present only locally are left untouched - the
/// outbound queue is the source of truth for their eventual upload.
pub fn reconcile(local: &[Event], remote: &[RemoteEvent]) -> (Vec<Event>, ReconcileOutcome) {
    let mut merged: BTreeMap<EventId, Event> = local
        .iter()
        .map(|e| (e.id.clone(), e.clone()))
        .collect();
    let mut outcome = ReconcileOutcome::default();

    for doc in remote {
        match merged.get(&doc.id) {
            None => {
                outcome.adopted.push(doc.id.clone());
                merged.insert(doc.id.clone(), doc.clone().into_event(SyncMarker::Synced));
            }
            Some(existing) => {
                // An unflushed local mutation wins regardless of timestamps.
                let keep_local = existing.sync_marker.is_pending()
                    || existing.updated_at >= doc.updated_at;
                if keep_local {
                    outcome.kept_local.push(doc.id.clone());
                } else {
                    outcome.overwritten.push(doc.id.clone());
                    merged.insert(doc.id.clone(), doc.clone().into_event(SyncMarker::Synced));
                }
            }
        }
    }

    let mut events: Vec<Event> = merged.into_values().collect();
    events.sort_by(|a, b| {
        b.occurred_at
            .cmp(&a.occurred_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    (events, outcome)
}
