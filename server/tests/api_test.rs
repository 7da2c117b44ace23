//! Protocol-level tests for the document API.
//!
//! These exercise the wire types and conflict semantics shared with the
//! engine and need no running PostgreSQL. End-to-end coverage against a
//! live database lives with the deployment, not here.

use chrono::{DateTime, Duration, Utc};
use sojourn_engine::event::parse_timestamp;
use sojourn_engine::reconcile::reconcile;
use sojourn_engine::{Event, EventKind, EventOrigin, RemoteEvent, SyncMarker};

fn at(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

/// Test helper to build a wire document.
fn doc(id: &str, owner: &str, updated_at: &str) -> RemoteEvent {
    let occurred = at("2024-01-05T08:30:00Z");
    RemoteEvent {
        id: id.to_string(),
        owner_id: owner.to_string(),
        kind: EventKind::Entry,
        occurred_at: occurred,
        occurred_zone: "Asia/Kolkata".to_string(),
        created_at: occurred,
        updated_at: at(updated_at),
        origin: EventOrigin::Quick,
        notes: None,
    }
}

#[test]
fn document_wire_format_is_camel_case() {
    let document = doc("ev-1", "owner-1", "2024-01-05T08:30:00Z");
    let json = serde_json::to_value(&document).unwrap();

    assert_eq!(json["id"], "ev-1");
    assert_eq!(json["ownerId"], "owner-1");
    assert_eq!(json["kind"], "ENTRY");
    assert_eq!(json["origin"], "quick");
    assert!(json.get("occurredAt").is_some());
    // The local-only sync marker never crosses the wire.
    assert!(json.get("syncMarker").is_none());

    let parsed: RemoteEvent = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, document);
}

#[test]
fn document_roundtrip_preserves_instants() {
    let document = doc("ev-1", "owner-1", "2024-01-05T08:30:00.123Z");
    let json = serde_json::to_string(&document).unwrap();
    let parsed: RemoteEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.updated_at, document.updated_at);
}

#[test]
fn malformed_kind_is_rejected_at_the_boundary() {
    let mut json = serde_json::to_value(doc("ev-1", "owner-1", "2024-01-05T08:30:00Z")).unwrap();
    json["kind"] = serde_json::Value::String("ARRIVAL".into());
    assert!(serde_json::from_value::<RemoteEvent>(json).is_err());
}

#[test]
fn last_write_wins_on_updated_at() {
    // The same document pushed from two devices: the later updated_at is
    // what a refetching client must converge on.
    let older = doc("shared", "owner-1", "2024-01-05T08:30:00Z");
    let newer = doc("shared", "owner-1", "2024-01-06T10:00:00Z");

    let local: Vec<Event> = vec![older.into_event(SyncMarker::Synced)];
    let (merged, outcome) = reconcile(&local, &[newer.clone()]);

    assert_eq!(outcome.overwritten, vec!["shared".to_string()]);
    assert_eq!(merged[0].updated_at, newer.updated_at);
}

#[test]
fn unflushed_client_state_survives_a_pull() {
    let server_copy = doc("shared", "owner-1", "2024-01-06T10:00:00Z");
    let mut local_copy = doc("shared", "owner-1", "2024-01-05T08:30:00Z")
        .into_event(SyncMarker::Queued);
    local_copy.notes = Some("edited on the plane".into());

    let (merged, outcome) = reconcile(&[local_copy], &[server_copy]);
    assert_eq!(outcome.kept_local, vec!["shared".to_string()]);
    assert_eq!(merged[0].notes.as_deref(), Some("edited on the plane"));
}

#[test]
fn listing_order_is_newest_first() {
    // The API contract: GET /owners/{owner}/events is descending by
    // occurred_at. The engine's reconcile output follows the same order.
    let mut a = doc("a", "owner-1", "2024-01-05T08:30:00Z");
    a.occurred_at = at("2024-01-01T00:00:00Z");
    let mut b = doc("b", "owner-1", "2024-01-05T08:30:00Z");
    b.occurred_at = at("2024-02-01T00:00:00Z");

    let (merged, _) = reconcile(&[], &[a, b]);
    assert!(merged[0].occurred_at > merged[1].occurred_at);
}

#[test]
fn stale_upsert_detection_matches_guard_semantics() {
    // The SQL guard is `events.updated_at <= EXCLUDED.updated_at`; equal
    // timestamps re-apply (idempotent retries), older ones do not.
    let stored = at("2024-01-06T10:00:00Z");
    for (incoming_offset, applied) in [(-1, false), (0, true), (1, true)] {
        let incoming = stored + Duration::hours(incoming_offset);
        assert_eq!(stored <= incoming, applied);
    }
}
