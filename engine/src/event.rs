//! The Event model - the only durable business fact.
//!
//! Events are discrete ENTRY/EXIT timestamps. `occurred_at` (UTC) is the
//! sort key for every derived computation; `occurred_zone` is a display
//! label and never participates in interval math.

use crate::{error::Result, Error, EventId, OwnerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether the person entered or left the jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "ENTRY")]
    Entry,
    #[serde(rename = "EXIT")]
    Exit,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Entry => write!(f, "ENTRY"),
            EventKind::Exit => write!(f, "EXIT"),
        }
    }
}

impl FromStr for EventKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ENTRY" => Ok(EventKind::Entry),
            "EXIT" => Ok(EventKind::Exit),
            other => Err(Error::InvalidKind(other.to_string())),
        }
    }
}

/// Provenance of an event. Display-only, no effect on accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOrigin {
    /// One-tap capture at the border
    Quick,
    /// Entered through the manual form
    Manual,
    /// Produced by an import pipeline
    Import,
}

impl fmt::Display for EventOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventOrigin::Quick => write!(f, "quick"),
            EventOrigin::Manual => write!(f, "manual"),
            EventOrigin::Import => write!(f, "import"),
        }
    }
}

impl FromStr for EventOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "quick" => Ok(EventOrigin::Quick),
            "manual" => Ok(EventOrigin::Manual),
            "import" => Ok(EventOrigin::Import),
            other => Err(Error::Validation(format!("unknown origin {other:?}"))),
        }
    }
}

/// Local-only outbound sync state of an event. Never persisted remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMarker {
    /// A local mutation is waiting in the outbound queue
    Queued,
    /// The remote store has confirmed the latest local state
    Synced,
    /// The last flush attempt for this event failed; still queued for retry
    Error,
}

impl SyncMarker {
    /// An unflushed local mutation exists for this event.
    pub fn is_pending(self) -> bool {
        matches!(self, SyncMarker::Queued | SyncMarker::Error)
    }
}

/// A presence event as held in the local store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Client-generated, globally unique, immutable
    pub id: EventId,
    /// Owning user
    pub owner_id: OwnerId,
    pub kind: EventKind,
    /// Absolute instant, authoritative for all accounting math
    pub occurred_at: DateTime<Utc>,
    /// IANA timezone label, display-only
    pub occurred_zone: String,
    pub created_at: DateTime<Utc>,
    /// Sole conflict tie-breaker between local and remote copies
    pub updated_at: DateTime<Utc>,
    pub origin: EventOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Local-only; stripped from the remote wire shape
    pub sync_marker: SyncMarker,
}

impl Event {
    /// Build a validated event from boundary input.
    ///
    /// Malformed timestamps and kinds are rejected here, before any write.
    pub fn from_new(owner_id: &str, input: NewEvent, now: DateTime<Utc>) -> Result<Self> {
        let kind = input.kind.parse::<EventKind>()?;
        let occurred_at = parse_timestamp(&input.occurred_at)?;
        if input.occurred_zone.is_empty() {
            return Err(Error::Validation("occurredZone must not be empty".into()));
        }

        Ok(Self {
            id: input
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            owner_id: owner_id.to_string(),
            kind,
            occurred_at,
            occurred_zone: input.occurred_zone,
            created_at: now,
            updated_at: now,
            origin: input.origin,
            notes: input.notes,
            sync_marker: SyncMarker::Queued,
        })
    }

    /// Apply a partial patch, bumping `updated_at` and re-queueing.
    pub fn apply_patch(&mut self, patch: EventPatch, now: DateTime<Utc>) -> Result<()> {
        if let Some(kind) = patch.kind {
            self.kind = kind.parse::<EventKind>()?;
        }
        if let Some(occurred_at) = patch.occurred_at {
            self.occurred_at = parse_timestamp(&occurred_at)?;
        }
        if let Some(zone) = patch.occurred_zone {
            if zone.is_empty() {
                return Err(Error::Validation("occurredZone must not be empty".into()));
            }
            self.occurred_zone = zone;
        }
        if let Some(origin) = patch.origin {
            self.origin = origin;
        }
        if let Some(notes) = patch.notes {
            self.notes = if notes.is_empty() { None } else { Some(notes) };
        }
        self.updated_at = now;
        self.sync_marker = SyncMarker::Queued;
        Ok(())
    }

    /// The wire shape sent to the remote store.
    pub fn remote_view(&self) -> RemoteEvent {
        RemoteEvent {
            id: self.id.clone(),
            owner_id: self.owner_id.clone(),
            kind: self.kind,
            occurred_at: self.occurred_at,
            occurred_zone: self.occurred_zone.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            origin: self.origin,
            notes: self.notes.clone(),
        }
    }
}

/// The remote wire shape of an event - identical to [`Event`] minus the
/// local-only sync marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEvent {
    pub id: EventId,
    pub owner_id: OwnerId,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
    pub occurred_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub origin: EventOrigin,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl RemoteEvent {
    /// Adopt a remote document into the local store with the given marker.
    pub fn into_event(self, marker: SyncMarker) -> Event {
        Event {
            id: self.id,
            owner_id: self.owner_id,
            kind: self.kind,
            occurred_at: self.occurred_at,
            occurred_zone: self.occurred_zone,
            created_at: self.created_at,
            updated_at: self.updated_at,
            origin: self.origin,
            notes: self.notes,
            sync_marker: marker,
        }
    }
}

impl From<&Event> for RemoteEvent {
    fn from(event: &Event) -> Self {
        event.remote_view()
    }
}

/// Boundary input for creating an event. Raw strings are validated in
/// [`Event::from_new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    /// Client may supply its own id; one is generated otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    /// "ENTRY" or "EXIT"
    pub kind: String,
    /// RFC 3339 instant
    pub occurred_at: String,
    pub occurred_zone: String,
    pub origin: EventOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Boundary input for updating an event. Absent fields are left unchanged;
/// an empty `notes` string clears the notes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<EventOrigin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Parse an RFC 3339 instant into UTC.
///
/// This is the single place malformed timestamps are turned into
/// [`Error::InvalidTimestamp`]; nothing downstream ever sees a sentinel.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::InvalidTimestamp(s.to_string()))
}
