//! Database operations for the events table.

use crate::error::AppError;
use chrono::{DateTime, Utc};
use sojourn_engine::{EventKind, EventOrigin, RemoteEvent};
use sqlx::{PgPool, Row};

/// A stored event row from the database.
#[derive(Debug)]
pub struct StoredEvent {
    pub owner_id: String,
    pub event_id: String,
    pub kind: String,
    pub occurred_at: DateTime<Utc>,
    pub occurred_zone: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub origin: String,
    pub notes: Option<String>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEvent {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEvent {
            owner_id: row.try_get("owner_id")?,
            event_id: row.try_get("event_id")?,
            kind: row.try_get("kind")?,
            occurred_at: row.try_get("occurred_at")?,
            occurred_zone: row.try_get("occurred_zone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            origin: row.try_get("origin")?,
            notes: row.try_get("notes")?,
        })
    }
}

impl StoredEvent {
    /// Convert a database row to the wire shape. The CHECK constraints make
    /// a parse failure here a corrupt row, not a client error.
    pub fn to_remote_event(&self) -> Result<RemoteEvent, AppError> {
        let kind: EventKind = self
            .kind
            .parse()
            .map_err(|_| AppError::Internal(format!("corrupt kind in row {}", self.event_id)))?;
        let origin: EventOrigin = self
            .origin
            .parse()
            .map_err(|_| AppError::Internal(format!("corrupt origin in row {}", self.event_id)))?;

        Ok(RemoteEvent {
            id: self.event_id.clone(),
            owner_id: self.owner_id.clone(),
            kind,
            occurred_at: self.occurred_at,
            occurred_zone: self.occurred_zone.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            origin,
            notes: self.notes.clone(),
        })
    }
}

/// Upsert an event document, last-write-wins on `updated_at`.
///
/// Returns whether the write was applied; `false` means a newer version is
/// already stored and the stale write was ignored.
pub async fn upsert_event(
    pool: &PgPool,
    owner_id: &str,
    event: &RemoteEvent,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO events (
            owner_id, event_id, kind, occurred_at, occurred_zone,
            created_at, updated_at, origin, notes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (owner_id, event_id) DO UPDATE SET
            kind = EXCLUDED.kind,
            occurred_at = EXCLUDED.occurred_at,
            occurred_zone = EXCLUDED.occurred_zone,
            updated_at = EXCLUDED.updated_at,
            origin = EXCLUDED.origin,
            notes = EXCLUDED.notes
        WHERE events.updated_at <= EXCLUDED.updated_at
        "#,
    )
    .bind(owner_id)
    .bind(&event.id)
    .bind(event.kind.to_string())
    .bind(event.occurred_at)
    .bind(&event.occurred_zone)
    .bind(event.created_at)
    .bind(event.updated_at)
    .bind(event.origin.to_string())
    .bind(&event.notes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete an event document. Deleting an absent document is not an error.
///
/// Returns whether a row was actually removed.
pub async fn delete_event(
    pool: &PgPool,
    owner_id: &str,
    event_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        DELETE FROM events
        WHERE owner_id = $1 AND event_id = $2
        "#,
    )
    .bind(owner_id)
    .bind(event_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// All event documents for an owner, newest first.
pub async fn list_events_by_owner(
    pool: &PgPool,
    owner_id: &str,
) -> Result<Vec<StoredEvent>, sqlx::Error> {
    sqlx::query_as::<_, StoredEvent>(
        r#"
        SELECT owner_id, event_id, kind, occurred_at, occurred_zone,
               created_at, updated_at, origin, notes
        FROM events
        WHERE owner_id = $1
        ORDER BY occurred_at DESC, event_id DESC
        "#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}
