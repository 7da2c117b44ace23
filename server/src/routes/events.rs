//! Event document routes.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{
    handle_delete, handle_list, handle_upsert, DeleteResponse, UpsertResponse,
};
use crate::AppState;
use sojourn_engine::RemoteEvent;

/// Create event document routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/owners/{owner_id}/events", get(list_handler))
        .route(
            "/owners/{owner_id}/events/{event_id}",
            put(upsert_handler).delete(delete_handler),
        )
}

/// PUT /owners/{owner_id}/events/{event_id} - upsert a document.
async fn upsert_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((owner_id, event_id)): Path<(String, String)>,
    Json(doc): Json<RemoteEvent>,
) -> Result<Json<UpsertResponse>> {
    auth.authorize(&owner_id)?;
    let response = handle_upsert(&state.pool, &owner_id, &event_id, doc).await?;
    Ok(Json(response))
}

/// DELETE /owners/{owner_id}/events/{event_id} - delete a document.
async fn delete_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((owner_id, event_id)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>> {
    auth.authorize(&owner_id)?;
    let response = handle_delete(&state.pool, &owner_id, &event_id).await?;
    Ok(Json(response))
}

/// GET /owners/{owner_id}/events - list documents, newest first.
async fn list_handler(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(owner_id): Path<String>,
) -> Result<Json<Vec<RemoteEvent>>> {
    auth.authorize(&owner_id)?;
    let events = handle_list(&state.pool, &owner_id).await?;
    Ok(Json(events))
}
