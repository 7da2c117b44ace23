//! Snapshot types for persisting and restoring local state.
//!
//! Snapshots are the bridge between the in-memory store and whatever
//! persistent KV the host embeds. BTreeMap keeps serialization order
//! deterministic, so identical state always produces identical bytes.

use crate::event::Event;
use crate::queue::QueueEntry;
use crate::{error::Result, Error, EventId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format for forward compatibility.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// A point-in-time image of the local store: the owner's events plus the
/// outbound queue. The summary cache is derived state and is not included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub format_version: u32,
    /// Events keyed by id, deterministically ordered
    pub events: BTreeMap<EventId, Event>,
    /// Outbound queue in enqueue order
    pub queue: Vec<QueueEntry>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl Snapshot {
    /// Create an empty snapshot at the current format version.
    pub fn new() -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            events: BTreeMap::new(),
            queue: Vec::new(),
        }
    }

    pub fn add_event(&mut self, event: Event) {
        self.events.insert(event.id.clone(), event);
    }

    pub fn add_queue_entry(&mut self, entry: QueueEntry) {
        self.queue.push(entry);
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Serialize to JSON with deterministic ordering.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON, rejecting newer format versions.
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))?;

        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        Ok(snapshot)
    }
}
