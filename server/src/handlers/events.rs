//! Event document handlers - the per-owner document API.

use crate::db;
use crate::error::{AppError, Result};
use serde::Serialize;
use sojourn_engine::RemoteEvent;
use sqlx::PgPool;

/// Response for an upsert.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    /// False when a newer version was already stored and this write was
    /// ignored (last-write-wins)
    pub applied: bool,
}

/// Response for a delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub removed: bool,
}

/// Reject documents whose body disagrees with the path they were sent to.
pub fn validate_document(owner_id: &str, event_id: &str, doc: &RemoteEvent) -> Result<()> {
    if doc.id != event_id {
        return Err(AppError::BadRequest(format!(
            "document id {:?} does not match path id {:?}",
            doc.id, event_id
        )));
    }
    if doc.owner_id != owner_id {
        return Err(AppError::BadRequest(format!(
            "document owner {:?} does not match path owner {:?}",
            doc.owner_id, owner_id
        )));
    }
    Ok(())
}

/// Upsert a document, last-write-wins on `updated_at`.
pub async fn handle_upsert(
    pool: &PgPool,
    owner_id: &str,
    event_id: &str,
    doc: RemoteEvent,
) -> Result<UpsertResponse> {
    validate_document(owner_id, event_id, &doc)?;

    let applied = db::upsert_event(pool, owner_id, &doc).await?;
    if !applied {
        tracing::debug!(owner = owner_id, event = event_id, "stale upsert ignored");
    }
    Ok(UpsertResponse { applied })
}

/// Delete a document. Idempotent: deleting an absent document succeeds.
pub async fn handle_delete(
    pool: &PgPool,
    owner_id: &str,
    event_id: &str,
) -> Result<DeleteResponse> {
    let removed = db::delete_event(pool, owner_id, event_id).await?;
    Ok(DeleteResponse { removed })
}

/// All documents for an owner, newest first.
pub async fn handle_list(pool: &PgPool, owner_id: &str) -> Result<Vec<RemoteEvent>> {
    let rows = db::list_events_by_owner(pool, owner_id).await?;
    rows.iter().map(|row| row.to_remote_event()).collect()
}
