//! The remote store seam - a per-owner document collection.
//!
//! The engine never speaks a wire protocol; it drives any document database
//! that can upsert, delete, and list by owner through [`RemoteStore`].
//! Failures are transient by definition: the outbound queue retries them on
//! the next flush and nothing is ever lost locally.

use crate::event::RemoteEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// A remote call failed. Always retryable; surfaced only through sync
/// status and per-event markers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteStoreError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("remote store rejected the request: {0}")]
    Rejected(String),
}

/// Result type for remote store operations.
pub type Result<T> = std::result::Result<T, RemoteStoreError>;

/// The system of record: a per-owner collection of event documents.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Insert or replace a document.
    async fn upsert(&self, owner_id: &str, event: RemoteEvent) -> Result<()>;

    /// Delete a document. Deleting an absent document is not an error.
    async fn delete(&self, owner_id: &str, id: &str) -> Result<()>;

    /// All documents for an owner, descending by `occurred_at`.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<RemoteEvent>>;
}

#[derive(Debug, Default)]
struct InMemoryRemoteInner {
    docs: BTreeMap<(String, String), RemoteEvent>,
    fail_next: u32,
    fail_ids: BTreeSet<String>,
    calls: u64,
}

/// Deterministic in-memory [`RemoteStore`] with failure injection, for
/// tests and offline development.
#[derive(Debug, Default)]
pub struct InMemoryRemote {
    inner: Mutex<InMemoryRemoteInner>,
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`RemoteStoreError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().fail_next = n;
    }

    /// Make every upsert/delete targeting the given document fail until
    /// [`Self::heal`] is called.
    pub fn fail_for(&self, id: &str) {
        self.inner.lock().fail_ids.insert(id.to_string());
    }

    /// Clear all per-document failure injection.
    pub fn heal(&self) {
        self.inner.lock().fail_ids.clear();
    }

    /// Total calls observed, successful or not.
    pub fn call_count(&self) -> u64 {
        self.inner.lock().calls
    }

    /// Current documents for an owner, for assertions.
    pub fn documents(&self, owner_id: &str) -> Vec<RemoteEvent> {
        let inner = self.inner.lock();
        inner
            .docs
            .iter()
            .filter(|((owner, _), _)| owner == owner_id)
            .map(|(_, doc)| doc.clone())
            .collect()
    }

    fn gate(inner: &mut InMemoryRemoteInner, id: Option<&str>) -> Result<()> {
        inner.calls += 1;
        if inner.fail_next > 0 {
            inner.fail_next -= 1;
            return Err(RemoteStoreError::Unavailable("injected failure".into()));
        }
        if let Some(id) = id {
            if inner.fail_ids.contains(id) {
                return Err(RemoteStoreError::Unavailable(format!(
                    "injected failure for {id}"
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn upsert(&self, owner_id: &str, event: RemoteEvent) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::gate(&mut inner, Some(event.id.as_str()))?;
        inner
            .docs
            .insert((owner_id.to_string(), event.id.clone()), event);
        Ok(())
    }

    async fn delete(&self, owner_id: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        Self::gate(&mut inner, Some(id))?;
        inner.docs.remove(&(owner_id.to_string(), id.to_string()));
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<RemoteEvent>> {
        let mut inner = self.inner.lock();
        Self::gate(&mut inner, None)?;
        let mut docs: Vec<RemoteEvent> = inner
            .docs
            .iter()
            .filter(|((owner, _), _)| owner == owner_id)
            .map(|(_, doc)| doc.clone())
            .collect();
        docs.sort_by(|a, b| {
            b.occurred_at
                .cmp(&a.occurred_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(docs)
    }
}
