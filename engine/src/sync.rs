//! The sync engine - optimistic local mutations, the collapsing outbound
//! queue, and opportunistic flushing against the remote store.
//!
//! Every mutation succeeds locally regardless of connectivity; only remote
//! consistency is delayed. One flush runs at a time, enforced by an
//! explicit idle/flushing token rather than an ambient flag, and a flush
//! that hits a failing entry keeps going - the entry stays queued for the
//! next pass.

use crate::accounting::{build_summary, Summary};
use crate::event::{Event, EventPatch, NewEvent, SyncMarker};
use crate::fingerprint::Fingerprint;
use crate::queue::{collapse, QueueEntry, QueueIntent};
use crate::reconcile::reconcile;
use crate::remote::RemoteStore;
use crate::store::LocalStore;
use crate::{error::Result, Error};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// Derived global sync state, never stored. Precedence:
/// offline > syncing > error > synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// No connectivity; the queue accumulates
    Offline,
    /// A flush is in progress, or intents are waiting for the next pass
    Syncing,
    /// At least one event failed its last flush attempt
    Error,
    /// Queue empty, nothing failed
    Synced,
}

/// The client core: local store, remote store, and the sync discipline
/// between them.
pub struct SyncEngine<L, R> {
    local: L,
    remote: R,
    online: AtomicBool,
    /// The single-flush-at-a-time token. Held exactly for the duration of
    /// one flush pass; `try_lock` failure means a pass is running.
    flush_gate: tokio::sync::Mutex<()>,
}

impl<L: LocalStore, R: RemoteStore> SyncEngine<L, R> {
    /// Create an engine over the two store seams. Starts online.
    pub fn new(local: L, remote: R) -> Self {
        Self {
            local,
            remote,
            online: AtomicBool::new(true),
            flush_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// The local store, e.g. for snapshot export.
    pub fn local(&self) -> &L {
        &self.local
    }

    /// The remote store seam.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Connectivity signal from the host.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn require_owner(owner_id: &str) -> Result<()> {
        if owner_id.is_empty() {
            return Err(Error::AuthRequired);
        }
        Ok(())
    }

    /// Create an event: validate, write locally, enqueue the intent.
    pub async fn create_event(&self, owner_id: &str, input: NewEvent) -> Result<Event> {
        Self::require_owner(owner_id)?;
        let event = Event::from_new(owner_id, input, Utc::now())?;
        if self.local.get(&event.id).await?.is_some() {
            return Err(Error::AlreadyExists(event.id));
        }

        self.local.put(event.clone()).await?;
        self.enqueue(QueueIntent::Create(event.clone())).await?;
        self.local.cache_invalidate().await?;
        tracing::debug!(event = %event.id, kind = %event.kind, "created event");
        Ok(event)
    }

    /// Patch an event: validate, write locally, enqueue the intent.
    pub async fn update_event(
        &self,
        owner_id: &str,
        id: &str,
        patch: EventPatch,
    ) -> Result<Event> {
        Self::require_owner(owner_id)?;
        let mut event = self
            .local
            .get(id)
            .await?
            .filter(|e| e.owner_id == owner_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        event.apply_patch(patch, Utc::now())?;
        self.local.put(event.clone()).await?;
        self.enqueue(QueueIntent::Update(event.clone())).await?;
        self.local.cache_invalidate().await?;
        tracing::debug!(event = %event.id, "updated event");
        Ok(event)
    }

    /// Delete an event locally and enqueue the remote delete.
    pub async fn delete_event(&self, owner_id: &str, id: &str) -> Result<()> {
        Self::require_owner(owner_id)?;
        self.local
            .get(id)
            .await?
            .filter(|e| e.owner_id == owner_id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        self.local.delete(id).await?;
        self.enqueue(QueueIntent::Delete {
            id: id.to_string(),
            owner_id: owner_id.to_string(),
        })
        .await?;
        self.local.cache_invalidate().await?;
        tracing::debug!(event = %id, "deleted event");
        Ok(())
    }

    /// The owner's events, descending by `occurred_at`.
    ///
    /// With `force_refresh` (or an empty local set) the remote snapshot is
    /// pulled and reconciled in first; a transient remote failure falls
    /// back to the local data.
    pub async fn list_events(&self, owner_id: &str, force_refresh: bool) -> Result<Vec<Event>> {
        Self::require_owner(owner_id)?;
        let local = self.local.list_by_owner(owner_id).await?;

        if force_refresh || local.is_empty() {
            match self.remote.list_by_owner(owner_id).await {
                Ok(remote_docs) => {
                    let (merged, outcome) = reconcile(&local, &remote_docs);
                    if outcome.changed() {
                        for event in &merged {
                            if outcome.adopted.contains(&event.id)
                                || outcome.overwritten.contains(&event.id)
                            {
                                self.local.put(event.clone()).await?;
                            }
                        }
                        self.local.cache_invalidate().await?;
                    }
                    tracing::debug!(
                        adopted = outcome.adopted.len(),
                        overwritten = outcome.overwritten.len(),
                        kept_local = outcome.kept_local.len(),
                        "reconciled remote snapshot"
                    );
                    return Ok(merged);
                }
                Err(err) => {
                    tracing::warn!(error = %err, "remote fetch failed, serving local data");
                }
            }
        }

        let mut events = local;
        events.reverse();
        Ok(events)
    }

    /// A full accounting pass as of now, memoized by event-set fingerprint.
    pub async fn summary(&self, owner_id: &str) -> Result<Summary> {
        self.summary_at(owner_id, Utc::now()).await
    }

    /// A full accounting pass at an explicit instant.
    pub async fn summary_at(&self, owner_id: &str, as_of: DateTime<Utc>) -> Result<Summary> {
        Self::require_owner(owner_id)?;
        let events = self.local.list_by_owner(owner_id).await?;
        let key = Fingerprint::of_events(&events);
        if let Some(cached) = self.local.cache_get(&key).await? {
            tracing::debug!(fingerprint = %key, "summary cache hit");
            return Ok(cached);
        }

        let summary = build_summary(&events, as_of)?;
        self.local.cache_set(key, summary.clone()).await?;
        Ok(summary)
    }

    /// Derived global sync state.
    pub async fn sync_status(&self) -> Result<SyncStatus> {
        if !self.is_online() {
            return Ok(SyncStatus::Offline);
        }
        if self.flush_gate.try_lock().is_err() {
            return Ok(SyncStatus::Syncing);
        }

        let queue = self.local.queue_list().await?;
        if queue.is_empty() {
            return Ok(SyncStatus::Synced);
        }
        for entry in &queue {
            if let Some(event) = self.local.get(entry.event_id()).await? {
                if event.sync_marker == SyncMarker::Error {
                    return Ok(SyncStatus::Error);
                }
            }
        }
        Ok(SyncStatus::Syncing)
    }

    /// One pass of draining the outbound queue against the remote store.
    ///
    /// Returns whether the queue fully drained. A pass already in flight or
    /// missing connectivity returns `false` without touching anything; an
    /// empty queue is a successful no-op. Individual entry failures leave
    /// the entry queued, mark the event `error`, and do not abort the pass.
    pub async fn flush(&self) -> Result<bool> {
        let Ok(_guard) = self.flush_gate.try_lock() else {
            tracing::debug!("flush already in progress, skipping");
            return Ok(false);
        };
        if !self.is_online() {
            tracing::debug!("offline, deferring flush");
            return Ok(false);
        }

        let queue = self.local.queue_list().await?;
        if queue.is_empty() {
            return Ok(true);
        }
        tracing::debug!(entries = queue.len(), "flushing outbound queue");

        let mut drained = true;
        let mut marker_flipped = false;
        for entry in queue {
            let result = match &entry.intent {
                QueueIntent::Create(event) | QueueIntent::Update(event) => {
                    self.remote
                        .upsert(&event.owner_id, event.remote_view())
                        .await
                }
                QueueIntent::Delete { id, owner_id } => self.remote.delete(owner_id, id).await,
            };

            match result {
                Ok(()) => {
                    self.local.queue_remove(&entry.id).await?;
                    if let Some(sent) = entry.intent.event() {
                        marker_flipped |= self.mark_if_current(sent, SyncMarker::Synced).await?;
                    }
                }
                Err(err) => {
                    drained = false;
                    tracing::warn!(
                        event = %entry.event_id(),
                        error = %err,
                        "flush entry failed, leaving queued for retry"
                    );
                    if let Some(sent) = entry.intent.event() {
                        marker_flipped |= self.mark_if_current(sent, SyncMarker::Error).await?;
                    }
                }
            }
        }

        if marker_flipped {
            self.local.cache_invalidate().await?;
        }
        tracing::debug!(drained, "flush pass finished");
        Ok(drained)
    }

    /// Flip the marker of the event a flushed payload belongs to, unless a
    /// newer local mutation superseded it mid-pass.
    async fn mark_if_current(&self, sent: &Event, marker: SyncMarker) -> Result<bool> {
        if let Some(mut current) = self.local.get(&sent.id).await? {
            if current.updated_at == sent.updated_at && current.sync_marker != marker {
                current.sync_marker = marker;
                self.local.put(current).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Append an intent, collapsing any queued entry for the same event.
    async fn enqueue(&self, intent: QueueIntent) -> Result<()> {
        let prior = self
            .local
            .queue_list()
            .await?
            .into_iter()
            .find(|entry| entry.event_id() == intent.event_id());

        match prior {
            Some(prior_entry) => {
                self.local.queue_remove(&prior_entry.id).await?;
                if let Some(merged) = collapse(&prior_entry, intent) {
                    self.local.queue_append(merged).await?;
                }
            }
            None => {
                self.local
                    .queue_append(QueueEntry::new(intent, Utc::now()))
                    .await?;
            }
        }
        Ok(())
    }
}
