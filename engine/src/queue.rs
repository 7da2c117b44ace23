//! The outbound queue - durable, ordered mutation intents.
//!
//! Every local mutation appends a [`QueueEntry`]; the sync engine drains
//! them against the remote store in enqueue order. Entries are never
//! mutated in place: a newer mutation for the same event collapses with the
//! queued one into a fresh entry that keeps the original enqueue time.

use crate::event::Event;
use crate::{EventId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The remote effect a queue entry asks for. Create and update carry the
/// full event (the remote effect is an upsert either way); delete carries a
/// reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "lowercase")]
pub enum QueueIntent {
    Create(Event),
    Update(Event),
    #[serde(rename_all = "camelCase")]
    Delete { id: EventId, owner_id: OwnerId },
}

impl QueueIntent {
    /// The event this intent targets.
    pub fn event_id(&self) -> &EventId {
        match self {
            QueueIntent::Create(event) | QueueIntent::Update(event) => &event.id,
            QueueIntent::Delete { id, .. } => id,
        }
    }

    /// The owner the remote effect applies under.
    pub fn owner_id(&self) -> &OwnerId {
        match self {
            QueueIntent::Create(event) | QueueIntent::Update(event) => &event.owner_id,
            QueueIntent::Delete { owner_id, .. } => owner_id,
        }
    }

    /// The carried event for create/update intents.
    pub fn event(&self) -> Option<&Event> {
        match self {
            QueueIntent::Create(event) | QueueIntent::Update(event) => Some(event),
            QueueIntent::Delete { .. } => None,
        }
    }
}

/// A durable mutation intent awaiting transmission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    /// Identity of the entry itself, not of the event
    pub id: String,
    pub enqueued_at: DateTime<Utc>,
    #[serde(flatten)]
    pub intent: QueueIntent,
}

impl QueueEntry {
    /// A fresh entry for a new intent.
    pub fn new(intent: QueueIntent, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            enqueued_at,
            intent,
        }
    }

    pub fn event_id(&self) -> &EventId {
        self.intent.event_id()
    }

    /// The merged entry replacing this one, keeping its queue position.
    fn merged(&self, intent: QueueIntent) -> Self {
        Self {
            id: self.id.clone(),
            enqueued_at: self.enqueued_at,
            intent,
        }
    }
}

/// Collapse a queued entry with a newer intent for the same event.
///
/// `Some(entry)` replaces the prior entry; `None` cancels it outright (the
/// event never reached the remote store and no longer needs to). Without
/// this merge, stale intermediate states could be replayed out of order
/// against the remote store.
pub fn collapse(prior: &QueueEntry, next: QueueIntent) -> Option<QueueEntry> {
    use QueueIntent::*;

    debug_assert_eq!(prior.event_id(), next.event_id());
    match (&prior.intent, next) {
        // Never created remotely: fold the newer state into the create.
        (Create(_), Update(event)) | (Create(_), Create(event)) => {
            Some(prior.merged(Create(event)))
        }
        // Created and deleted before ever flushing: net effect is nothing.
        (Create(_), Delete { .. }) => None,
        // Later update supersedes; the original enqueue time is kept.
        (Update(_), Update(event)) | (Update(_), Create(event)) => {
            Some(prior.merged(Update(event)))
        }
        // Anything pending plus a delete is just the delete.
        (Update(_), Delete { id, owner_id }) | (Delete { .. }, Delete { id, owner_id }) => {
            Some(prior.merged(Delete { id, owner_id }))
        }
        // Deleted then recreated: the upsert resurrects the document.
        (Delete { .. }, Create(event)) | (Delete { .. }, Update(event)) => {
            Some(prior.merged(Create(event)))
        }
    }
}
