//! The local store seam - events by owner, the outbound queue, and the
//! summary cache.
//!
//! The engine talks to client persistence only through [`LocalStore`];
//! [`MemoryStore`] is the provided implementation, with snapshot
//! export/import as the bridge to whatever durable KV the host embeds.

use crate::accounting::Summary;
use crate::event::Event;
use crate::fingerprint::Fingerprint;
use crate::queue::QueueEntry;
use crate::snapshot::{Snapshot, SNAPSHOT_FORMAT_VERSION};
use crate::{error::Result as EngineResult, Error};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

/// Failures of the local persistence backend.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Result type for local store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Client-side persistence for events, the outbound queue, and the derived
/// summary cache. Implementations must keep `queue_list` in enqueue order
/// and `list_by_owner` ascending by `(occurred_at, id)`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<Event>>;
    async fn put(&self, event: Event) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Event>>;

    async fn queue_append(&self, entry: QueueEntry) -> Result<()>;
    async fn queue_list(&self) -> Result<Vec<QueueEntry>>;
    async fn queue_remove(&self, entry_id: &str) -> Result<()>;

    async fn cache_get(&self, key: &Fingerprint) -> Result<Option<Summary>>;
    async fn cache_set(&self, key: Fingerprint, summary: Summary) -> Result<()>;
    async fn cache_invalidate(&self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    events: BTreeMap<String, Event>,
    /// Queue entries with a monotone sequence for stable ordering when
    /// enqueue times collide.
    queue: Vec<(u64, QueueEntry)>,
    queue_seq: u64,
    /// Single-slot memoization of the last accounting pass.
    cache: Option<(Fingerprint, Summary)>,
}

/// Deterministic in-memory [`LocalStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export events and queue as a versioned snapshot for persistence.
    pub fn export_snapshot(&self) -> Snapshot {
        let inner = self.inner.lock();
        let mut snapshot = Snapshot::new();
        for event in inner.events.values() {
            snapshot.add_event(event.clone());
        }
        for (_, entry) in &inner.queue {
            snapshot.add_queue_entry(entry.clone());
        }
        snapshot
    }

    /// Rebuild a store from a snapshot. The summary cache starts cold.
    pub fn from_snapshot(snapshot: Snapshot) -> EngineResult<Self> {
        if snapshot.format_version > SNAPSHOT_FORMAT_VERSION {
            return Err(Error::InvalidSnapshot(format!(
                "unsupported snapshot format version: {} (max supported: {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }

        let mut inner = MemoryStoreInner::default();
        for (id, event) in snapshot.events {
            if id != event.id {
                return Err(Error::InvalidSnapshot(format!(
                    "event keyed as {id} carries id {}",
                    event.id
                )));
            }
            inner.events.insert(id, event);
        }
        for entry in snapshot.queue {
            let seq = inner.queue_seq;
            inner.queue_seq += 1;
            inner.queue.push((seq, entry));
        }
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Option<Event>> {
        Ok(self.inner.lock().events.get(id).cloned())
    }

    async fn put(&self, event: Event) -> Result<()> {
        self.inner.lock().events.insert(event.id.clone(), event);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.inner.lock().events.remove(id);
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Event>> {
        let inner = self.inner.lock();
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| e.owner_id == owner_id)
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(events)
    }

    async fn queue_append(&self, entry: QueueEntry) -> Result<()> {
        let mut inner = self.inner.lock();
        let seq = inner.queue_seq;
        inner.queue_seq += 1;
        inner.queue.push((seq, entry));
        Ok(())
    }

    async fn queue_list(&self) -> Result<Vec<QueueEntry>> {
        let inner = self.inner.lock();
        let mut entries = inner.queue.clone();
        // Merged entries keep their original enqueue time, so time first,
        // insertion sequence as the tie-break.
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            a.enqueued_at
                .cmp(&b.enqueued_at)
                .then_with(|| seq_a.cmp(seq_b))
        });
        Ok(entries.into_iter().map(|(_, e)| e).collect())
    }

    async fn queue_remove(&self, entry_id: &str) -> Result<()> {
        self.inner.lock().queue.retain(|(_, e)| e.id != entry_id);
        Ok(())
    }

    async fn cache_get(&self, key: &Fingerprint) -> Result<Option<Summary>> {
        let inner = self.inner.lock();
        Ok(inner
            .cache
            .as_ref()
            .filter(|(cached_key, _)| cached_key == key)
            .map(|(_, summary)| summary.clone()))
    }

    async fn cache_set(&self, key: Fingerprint, summary: Summary) -> Result<()> {
        self.inner.lock().cache = Some((key, summary));
        Ok(())
    }

    async fn cache_invalidate(&self) -> Result<()> {
        self.inner.lock().cache = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounting::build_summary;
    use crate::event::{parse_timestamp, EventKind, EventOrigin, SyncMarker};
    use crate::queue::QueueIntent;
    use chrono::Duration;

    fn ev(id: &str, owner: &str, occurred_at: &str) -> Event {
        let instant = parse_timestamp(occurred_at).unwrap();
        Event {
            id: id.to_string(),
            owner_id: owner.to_string(),
            kind: EventKind::Entry,
            occurred_at: instant,
            occurred_zone: "Asia/Kolkata".to_string(),
            created_at: instant,
            updated_at: instant,
            origin: EventOrigin::Quick,
            notes: None,
            sync_marker: SyncMarker::Queued,
        }
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let store = MemoryStore::new();
        let event = ev("a", "owner-1", "2023-01-01T00:00:00Z");
        store.put(event.clone()).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(event));

        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_by_owner_filters_and_sorts() {
        let store = MemoryStore::new();
        store
            .put(ev("b", "owner-1", "2023-01-02T00:00:00Z"))
            .await
            .unwrap();
        store
            .put(ev("a", "owner-1", "2023-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .put(ev("x", "owner-2", "2023-01-01T00:00:00Z"))
            .await
            .unwrap();

        let events = store.list_by_owner("owner-1").await.unwrap();
        assert_eq!(
            events.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[tokio::test]
    async fn queue_preserves_enqueue_order() {
        let store = MemoryStore::new();
        let t0 = parse_timestamp("2023-01-01T00:00:00Z").unwrap();

        let first = QueueEntry::new(
            QueueIntent::Create(ev("a", "owner-1", "2023-01-01T00:00:00Z")),
            t0,
        );
        let second = QueueEntry::new(
            QueueIntent::Create(ev("b", "owner-1", "2023-01-02T00:00:00Z")),
            t0 + Duration::seconds(1),
        );
        store.queue_append(second.clone()).await.unwrap();
        store.queue_append(first.clone()).await.unwrap();

        let listed = store.queue_list().await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);

        store.queue_remove(&first.id).await.unwrap();
        let listed = store.queue_list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, second.id);
    }

    #[tokio::test]
    async fn merged_entry_keeps_queue_position() {
        let store = MemoryStore::new();
        let t0 = parse_timestamp("2023-01-01T00:00:00Z").unwrap();

        let early = QueueEntry::new(
            QueueIntent::Create(ev("a", "owner-1", "2023-01-01T00:00:00Z")),
            t0,
        );
        let late = QueueEntry::new(
            QueueIntent::Create(ev("b", "owner-1", "2023-01-02T00:00:00Z")),
            t0 + Duration::seconds(5),
        );
        store.queue_append(early.clone()).await.unwrap();
        store.queue_append(late).await.unwrap();

        // Simulate a collapse: remove the early entry and re-append its
        // merged replacement with the original enqueue time.
        store.queue_remove(&early.id).await.unwrap();
        store.queue_append(early.clone()).await.unwrap();

        let listed = store.queue_list().await.unwrap();
        assert_eq!(listed[0].id, early.id);
    }

    #[tokio::test]
    async fn cache_slot_matches_on_fingerprint() {
        let store = MemoryStore::new();
        let events = vec![ev("a", "owner-1", "2023-01-01T00:00:00Z")];
        let as_of = parse_timestamp("2023-02-01T00:00:00Z").unwrap();
        let summary = build_summary(&events, as_of).unwrap();
        let key = summary.fingerprint.clone();

        store
            .cache_set(key.clone(), summary.clone())
            .await
            .unwrap();
        assert_eq!(store.cache_get(&key).await.unwrap(), Some(summary));

        let other = Fingerprint::of_events(&[]);
        assert_eq!(store.cache_get(&other).await.unwrap(), None);

        store.cache_invalidate().await.unwrap();
        assert_eq!(store.cache_get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_roundtrip() {
        let store = MemoryStore::new();
        store
            .put(ev("a", "owner-1", "2023-01-01T00:00:00Z"))
            .await
            .unwrap();
        store
            .queue_append(QueueEntry::new(
                QueueIntent::Create(ev("a", "owner-1", "2023-01-01T00:00:00Z")),
                parse_timestamp("2023-01-01T00:00:00Z").unwrap(),
            ))
            .await
            .unwrap();

        let snapshot = store.export_snapshot();
        assert_eq!(snapshot.event_count(), 1);
        assert_eq!(snapshot.queue.len(), 1);

        let restored = MemoryStore::from_snapshot(snapshot).unwrap();
        assert!(restored.get("a").await.unwrap().is_some());
        assert_eq!(restored.queue_list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshot_rejects_mismatched_key() {
        let mut snapshot = Snapshot::new();
        let mut event = ev("a", "owner-1", "2023-01-01T00:00:00Z");
        event.id = "b".to_string();
        snapshot.events.insert("a".to_string(), event);

        assert!(matches!(
            MemoryStore::from_snapshot(snapshot),
            Err(Error::InvalidSnapshot(_))
        ));
    }
}
