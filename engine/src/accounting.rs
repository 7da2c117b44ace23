//! Overlap-based day accounting over trips.
//!
//! Pure and synchronous: no I/O, no suspension. All instants are UTC and
//! all math is millisecond-exact. Day counts are returned unrounded -
//! display precision belongs to callers, applied uniformly per report.

use crate::error::Result;
use crate::event::{Event, EventKind};
use crate::fingerprint::Fingerprint;
use crate::trips::{detect_anomalies, pair_trips, Anomaly, Trip};
use crate::Error;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds per day, the sole unit conversion in the engine.
pub const MS_PER_DAY: f64 = 86_400_000.0;

/// Rolling windows the summary reports, in days.
pub const ROLLING_SHORT_DAYS: i64 = 182;
pub const ROLLING_LONG_DAYS: i64 = 365;

/// Days of presence the forecast defends by default.
pub const DEFAULT_THRESHOLD_DAYS: f64 = 182.0;

/// Sum of each trip's overlap with `[window_start, window_end]`, in days.
///
/// Open trips run until `as_of`. Trips entirely outside the window
/// contribute zero; partial overlaps are clamped to the window edges.
pub fn overlap_days(
    trips: &[Trip],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> f64 {
    let mut total_ms: i64 = 0;
    for trip in trips {
        let start = trip.start.occurred_at.max(window_start);
        let end = trip.effective_end(as_of).min(window_end);
        let ms = (end - start).num_milliseconds();
        if ms > 0 {
            total_ms += ms;
        }
    }
    total_ms as f64 / MS_PER_DAY
}

/// Days present in the trailing `days`-day window ending at `as_of`.
pub fn rolling_window_days(trips: &[Trip], days: i64, as_of: DateTime<Utc>) -> f64 {
    overlap_days(trips, as_of - Duration::days(days), as_of, as_of)
}

/// The fiscal year window: April 1 00:00:00.000 UTC of `year` through
/// March 31 23:59:59.999 UTC of `year + 1`.
pub fn fiscal_year_window(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let out_of_range = || Error::InvalidTimestamp(format!("fiscal year {year} out of range"));
    let start = Utc
        .with_ymd_and_hms(year, 4, 1, 0, 0, 0)
        .single()
        .ok_or_else(out_of_range)?;
    let end = Utc
        .with_ymd_and_hms(year.checked_add(1).ok_or_else(out_of_range)?, 3, 31, 23, 59, 59)
        .single()
        .ok_or_else(out_of_range)?
        + Duration::milliseconds(999);
    Ok((start, end))
}

/// Days present in the given fiscal year, counted up to `as_of`.
pub fn fiscal_year_days(trips: &[Trip], year: i32, as_of: DateTime<Utc>) -> Result<f64> {
    let (start, end) = fiscal_year_window(year)?;
    Ok(overlap_days(trips, start, end.min(as_of), as_of))
}

/// The fiscal year `as_of` falls in: the calendar year when April or later,
/// the previous one otherwise.
pub fn fiscal_year_of(as_of: DateTime<Utc>) -> i32 {
    if as_of.month() >= 4 {
        as_of.year()
    } else {
        as_of.year() - 1
    }
}

/// How many more presence days fit before `target` without crossing
/// `threshold_days` in the trailing 365-day window ending at `target`.
///
/// Capped at the calendar days left between `as_of` and `target` - there is
/// no forecasting more remaining days than exist before the target.
pub fn forecast(
    trips: &[Trip],
    target: DateTime<Utc>,
    threshold_days: f64,
    as_of: DateTime<Utc>,
) -> f64 {
    let consumed = overlap_days(trips, target - Duration::days(365), target, as_of);
    let remaining = (threshold_days - consumed).max(0.0);
    let runway = (target - as_of).num_milliseconds().max(0) as f64 / MS_PER_DAY;
    remaining.min(runway)
}

/// Whether the latest event puts the person inside the jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PresenceStatus {
    Inside,
    Outside,
}

/// One full accounting pass over an owner's events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub presence: PresenceStatus,
    /// Days elapsed in the currently open stay, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stay_days: Option<f64>,
    pub rolling_182_days: f64,
    pub rolling_365_days: f64,
    pub current_fy_days: f64,
    pub previous_fy_days: f64,
    pub trips: Vec<Trip>,
    pub anomalies: Vec<Anomaly>,
    /// The event-set fingerprint this pass was computed from
    pub fingerprint: Fingerprint,
}

/// Run a full accounting pass at `as_of`.
pub fn build_summary(events: &[Event], as_of: DateTime<Utc>) -> Result<Summary> {
    let trips = pair_trips(events, as_of);
    let anomalies = detect_anomalies(events, as_of);
    let fingerprint = Fingerprint::of_events(events);

    let presence = events
        .iter()
        .max_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|latest| match latest.kind {
            EventKind::Entry => PresenceStatus::Inside,
            EventKind::Exit => PresenceStatus::Outside,
        })
        .unwrap_or(PresenceStatus::Outside);

    let current_stay_days = trips
        .last()
        .filter(|t| t.is_open())
        .map(|t| (as_of - t.start.occurred_at).num_milliseconds().max(0) as f64 / MS_PER_DAY);

    let fy = fiscal_year_of(as_of);
    Ok(Summary {
        presence,
        current_stay_days,
        rolling_182_days: rolling_window_days(&trips, ROLLING_SHORT_DAYS, as_of),
        rolling_365_days: rolling_window_days(&trips, ROLLING_LONG_DAYS, as_of),
        current_fy_days: fiscal_year_days(&trips, fy, as_of)?,
        previous_fy_days: fiscal_year_days(&trips, fy - 1, as_of)?,
        trips,
        anomalies,
        fingerprint,
    })
}

// Convenience surface over raw event lists, evaluated at the wall clock.

/// Pair an owner's events into trips as of now.
pub fn build_trips(events: &[Event]) -> Vec<Trip> {
    pair_trips(events, Utc::now())
}

/// Days present in the trailing `days`-day window ending now.
pub fn rolling_days(events: &[Event], days: i64) -> f64 {
    let as_of = Utc::now();
    rolling_window_days(&pair_trips(events, as_of), days, as_of)
}

/// Days present in the given fiscal year, counted up to now.
pub fn fiscal_year_total(events: &[Event], year: i32) -> Result<f64> {
    let as_of = Utc::now();
    fiscal_year_days(&pair_trips(events, as_of), year, as_of)
}

/// Remaining presence days before `target` under `threshold_days`.
pub fn forecast_days(events: &[Event], target: DateTime<Utc>, threshold_days: f64) -> f64 {
    let as_of = Utc::now();
    forecast(&pair_trips(events, as_of), target, threshold_days, as_of)
}

/// Every anomaly in the event stream as of now.
pub fn anomalies(events: &[Event]) -> Vec<Anomaly> {
    detect_anomalies(events, Utc::now())
}
