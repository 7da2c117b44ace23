//! Trip pairing - turning an unordered event stream into stay intervals.
//!
//! A trip is a maximal interval of presence bounded by an ENTRY and an
//! optional EXIT. Pairing is a single deterministic scan over the events
//! sorted by `(occurred_at, id)`; data-quality gaps become [`Anomaly`]
//! warnings instead of errors.

use crate::event::{Event, EventKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Two same-kind events closer than this are flagged as duplicates.
pub const DUPLICATE_EPSILON_MINUTES: i64 = 2;

/// An open trip older than this is flagged for review.
pub const OPEN_TRIP_REVIEW_DAYS: i64 = 120;

/// A data-quality warning attached to a trip or surfaced by
/// [`detect_anomalies`]. `Display` renders the canonical user-facing string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Anomaly {
    /// An ENTRY was followed by another ENTRY with no EXIT in between
    MissingExit,
    /// Two same-kind events within the 2-minute epsilon
    DuplicateWithinEpsilon,
    /// An open trip has been running for more than 120 days
    OpenTripExceedsReview,
    /// An EXIT with no preceding open ENTRY; excluded from trips
    OrphanExit { occurred_at: DateTime<Utc> },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::MissingExit => write!(f, "missing EXIT"),
            Anomaly::DuplicateWithinEpsilon => write!(f, "duplicate within 2min"),
            Anomaly::OpenTripExceedsReview => {
                write!(f, "open trip exceeds {} days, review", OPEN_TRIP_REVIEW_DAYS)
            }
            Anomaly::OrphanExit { occurred_at } => {
                write!(f, "orphaned EXIT at {}", occurred_at.to_rfc3339())
            }
        }
    }
}

/// A maximal interval of presence. Derived, never persisted authoritatively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    /// Always an ENTRY event
    pub start: Event,
    /// `None` while the stay is still open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<Event>,
    pub warnings: Vec<Anomaly>,
}

impl Trip {
    /// Whether the stay has no recorded EXIT yet.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// The instant the trip effectively ends for accounting: its EXIT, or
    /// `as_of` while still open.
    pub fn effective_end(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        self.end
            .as_ref()
            .map(|e| e.occurred_at)
            .unwrap_or(as_of)
    }
}

/// Pair events into trips.
///
/// Guarantees: trip count <= ENTRY count, every ENTRY appears in exactly one
/// trip, and every trip starts with an ENTRY. EXITs with no open ENTRY are
/// excluded here and reported by [`detect_anomalies`].
pub fn pair_trips(events: &[Event], as_of: DateTime<Utc>) -> Vec<Trip> {
    scan(events, as_of).0
}

/// Every anomaly in the event stream: orphaned EXITs plus all trip warnings.
pub fn detect_anomalies(events: &[Event], as_of: DateTime<Utc>) -> Vec<Anomaly> {
    let (trips, orphans) = scan(events, as_of);
    let mut anomalies: Vec<Anomaly> = trips.into_iter().flat_map(|t| t.warnings).collect();
    anomalies.extend(orphans.into_iter().map(|e| Anomaly::OrphanExit {
        occurred_at: e.occurred_at,
    }));
    anomalies
}

/// The shared scan: trips plus the orphaned EXITs that were dropped.
fn scan(events: &[Event], as_of: DateTime<Utc>) -> (Vec<Trip>, Vec<Event>) {
    let mut sorted: Vec<&Event> = events.iter().collect();
    // Stable tie-break by id keeps the scan deterministic when timestamps collide.
    sorted.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let epsilon = Duration::minutes(DUPLICATE_EPSILON_MINUTES);
    let mut trips: Vec<Trip> = Vec::new();
    let mut orphans: Vec<Event> = Vec::new();
    let mut open: Option<&Event> = None;
    // Warnings accumulated for the currently open entry's eventual trip.
    let mut pending: Vec<Anomaly> = Vec::new();
    let mut prev: Option<&Event> = None;

    for event in sorted {
        let duplicate = prev
            .map(|p| p.kind == event.kind && event.occurred_at - p.occurred_at <= epsilon)
            .unwrap_or(false);

        match event.kind {
            EventKind::Entry => {
                if let Some(prior) = open.take() {
                    let mut warnings = std::mem::take(&mut pending);
                    warnings.push(Anomaly::MissingExit);
                    trips.push(Trip {
                        start: prior.clone(),
                        end: None,
                        warnings,
                    });
                }
                open = Some(event);
                if duplicate {
                    pending.push(Anomaly::DuplicateWithinEpsilon);
                }
            }
            EventKind::Exit => {
                if let Some(prior) = open.take() {
                    trips.push(Trip {
                        start: prior.clone(),
                        end: Some(event.clone()),
                        warnings: std::mem::take(&mut pending),
                    });
                } else {
                    orphans.push(event.clone());
                    if duplicate {
                        // The later EXIT has no trip of its own; flag the one
                        // its twin just closed.
                        if let Some(last) = trips.last_mut() {
                            last.warnings.push(Anomaly::DuplicateWithinEpsilon);
                        }
                    }
                }
            }
        }
        prev = Some(event);
    }

    if let Some(prior) = open {
        let mut warnings = std::mem::take(&mut pending);
        if as_of - prior.occurred_at > Duration::days(OPEN_TRIP_REVIEW_DAYS) {
            warnings.push(Anomaly::OpenTripExceedsReview);
        }
        trips.push(Trip {
            start: prior.clone(),
            end: None,
            warnings,
        });
    }

    (trips, orphans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{parse_timestamp, EventOrigin, SyncMarker};

    fn ev(id: &str, kind: EventKind, occurred_at: &str) -> Event {
        let instant = parse_timestamp(occurred_at).unwrap();
        Event {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            kind,
            occurred_at: instant,
            occurred_zone: "Asia/Kolkata".to_string(),
            created_at: instant,
            updated_at: instant,
            origin: EventOrigin::Quick,
            notes: None,
            sync_marker: SyncMarker::Synced,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    #[test]
    fn pairs_entry_exit() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Exit, "2023-01-11T00:00:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-02-01T00:00:00Z"));
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].start.id, "e1");
        assert_eq!(trips[0].end.as_ref().unwrap().id, "e2");
        assert!(trips[0].warnings.is_empty());
    }

    #[test]
    fn unsorted_input_is_sorted_first() {
        let events = vec![
            ev("e2", EventKind::Exit, "2023-01-11T00:00:00Z"),
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-02-01T00:00:00Z"));
        assert_eq!(trips.len(), 1);
        assert!(!trips[0].is_open());
    }

    #[test]
    fn trailing_entry_stays_open() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Exit, "2023-01-11T00:00:00Z"),
            ev("e3", EventKind::Entry, "2023-02-01T00:00:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-02-10T00:00:00Z"));
        assert_eq!(trips.len(), 2);
        assert!(trips[1].is_open());
        assert!(trips[1].warnings.is_empty());
    }

    #[test]
    fn entry_over_open_entry_closes_with_missing_exit() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Entry, "2023-01-15T00:00:00Z"),
            ev("e3", EventKind::Exit, "2023-01-20T00:00:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-02-01T00:00:00Z"));
        assert_eq!(trips.len(), 2);
        assert!(trips[0].is_open());
        assert_eq!(trips[0].warnings, vec![Anomaly::MissingExit]);
        assert_eq!(trips[1].start.id, "e2");
        assert!(!trips[1].is_open());
    }

    #[test]
    fn orphan_exit_dropped_from_trips_but_reported() {
        let events = vec![
            ev("e1", EventKind::Exit, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Entry, "2023-01-05T00:00:00Z"),
        ];
        let as_of = at("2023-01-10T00:00:00Z");
        let trips = pair_trips(&events, as_of);
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].start.id, "e2");

        let anomalies = detect_anomalies(&events, as_of);
        assert!(anomalies.contains(&Anomaly::OrphanExit {
            occurred_at: at("2023-01-01T00:00:00Z")
        }));
    }

    #[test]
    fn duplicate_entries_within_epsilon_flag_later_trip() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Entry, "2023-01-01T00:01:30Z"),
        ];
        let trips = pair_trips(&events, at("2023-01-02T00:00:00Z"));
        assert_eq!(trips.len(), 2);
        // The earlier trip carries the missing-EXIT warning, the later one
        // the duplicate flag.
        assert_eq!(trips[0].warnings, vec![Anomaly::MissingExit]);
        assert_eq!(trips[1].warnings, vec![Anomaly::DuplicateWithinEpsilon]);
    }

    #[test]
    fn duplicate_exits_within_epsilon_flag_closed_trip() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Exit, "2023-01-05T00:00:00Z"),
            ev("e3", EventKind::Exit, "2023-01-05T00:01:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-01-10T00:00:00Z"));
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].warnings, vec![Anomaly::DuplicateWithinEpsilon]);
    }

    #[test]
    fn entries_beyond_epsilon_are_not_duplicates() {
        let events = vec![
            ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Entry, "2023-01-01T00:05:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-01-02T00:00:00Z"));
        assert_eq!(trips[1].warnings, Vec::<Anomaly>::new());
    }

    #[test]
    fn long_open_trip_flagged_for_review() {
        let events = vec![ev("e1", EventKind::Entry, "2023-01-01T00:00:00Z")];
        let trips = pair_trips(&events, at("2023-06-01T00:00:00Z"));
        assert_eq!(trips[0].warnings, vec![Anomaly::OpenTripExceedsReview]);

        // Exactly at the boundary is not flagged.
        let trips = pair_trips(&events, at("2023-05-01T00:00:00Z"));
        assert!(trips[0].warnings.is_empty());
    }

    #[test]
    fn colliding_timestamps_break_ties_by_id() {
        let events = vec![
            ev("b", EventKind::Exit, "2023-01-01T00:00:00Z"),
            ev("a", EventKind::Entry, "2023-01-01T00:00:00Z"),
        ];
        // "a" sorts first, so the ENTRY opens and the EXIT closes it.
        let trips = pair_trips(&events, at("2023-01-02T00:00:00Z"));
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].start.id, "a");
        assert!(!trips[0].is_open());
    }

    #[test]
    fn every_trip_starts_with_entry() {
        let events = vec![
            ev("e1", EventKind::Exit, "2023-01-01T00:00:00Z"),
            ev("e2", EventKind::Entry, "2023-01-02T00:00:00Z"),
            ev("e3", EventKind::Entry, "2023-01-03T00:00:00Z"),
            ev("e4", EventKind::Exit, "2023-01-04T00:00:00Z"),
            ev("e5", EventKind::Exit, "2023-01-05T00:00:00Z"),
        ];
        let trips = pair_trips(&events, at("2023-01-10T00:00:00Z"));
        assert!(trips.iter().all(|t| t.start.kind == EventKind::Entry));
        let entries = events
            .iter()
            .filter(|e| e.kind == EventKind::Entry)
            .count();
        assert!(trips.len() <= entries);
    }

    #[test]
    fn anomaly_display_strings() {
        assert_eq!(Anomaly::MissingExit.to_string(), "missing EXIT");
        assert_eq!(
            Anomaly::DuplicateWithinEpsilon.to_string(),
            "duplicate within 2min"
        );
        assert_eq!(
            Anomaly::OpenTripExceedsReview.to_string(),
            "open trip exceeds 120 days, review"
        );
        let orphan = Anomaly::OrphanExit {
            occurred_at: at("2023-01-01T00:00:00Z"),
        };
        assert_eq!(orphan.to_string(), "orphaned EXIT at 2023-01-01T00:00:00+00:00");
    }

    #[test]
    fn empty_input_yields_nothing() {
        let as_of = at("2023-01-01T00:00:00Z");
        assert!(pair_trips(&[], as_of).is_empty());
        assert!(detect_anomalies(&[], as_of).is_empty());
    }
}
