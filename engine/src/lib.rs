//! # Sojourn Engine
//!
//! The client core of Sojourn: residency day accounting over ENTRY/EXIT
//! presence events, and offline-first synchronization of those events
//! against a remote per-owner document store.
//!
//! ## Design Principles
//!
//! - **Optimistic**: every local mutation succeeds immediately; remote
//!   consistency is eventual and retried
//! - **Deterministic**: accounting and reconciliation are pure functions -
//!   the same inputs always produce the same outputs
//! - **Transport-free**: all I/O goes through the [`LocalStore`] and
//!   [`RemoteStore`] seams; the engine never opens a socket or a file
//!
//! ## Core Concepts
//!
//! ### Events
//!
//! An [`Event`] is the only durable business fact: an ENTRY or EXIT at an
//! absolute UTC instant, owned by a user. `updated_at` is the sole conflict
//! tie-breaker between local and remote copies.
//!
//! ### Trips and day counts
//!
//! The accounting engine pairs events into [`Trip`]s and computes exact,
//! overlap-based day counts over rolling windows, April-March fiscal
//! years, and forecast horizons. Data-quality gaps surface as [`Anomaly`]
//! warnings, never as errors.
//!
//! ### The outbound queue
//!
//! Every mutation appends a durable [`QueueEntry`]; entries for the same
//! event collapse so stale intermediate states are never replayed against
//! the remote store. [`SyncEngine::flush`] drains the queue in enqueue
//! order, tolerating per-entry failures.
//!
//! ## Quick Start
//!
//! ```rust
//! use sojourn_engine::{
//!     EventOrigin, InMemoryRemote, MemoryStore, NewEvent, SyncEngine,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), sojourn_engine::Error> {
//! let engine = SyncEngine::new(MemoryStore::new(), InMemoryRemote::new());
//!
//! // Mutations apply locally even with no connectivity.
//! engine.set_online(false);
//! engine
//!     .create_event(
//!         "traveller-7",
//!         NewEvent {
//!             id: None,
//!             kind: "ENTRY".into(),
//!             occurred_at: "2024-01-05T08:30:00Z".into(),
//!             occurred_zone: "Asia/Kolkata".into(),
//!             origin: EventOrigin::Quick,
//!             notes: None,
//!         },
//!     )
//!     .await?;
//!
//! // Back online, one flush pass uploads the queued intent.
//! engine.set_online(true);
//! assert!(engine.flush().await?);
//!
//! let summary = engine.summary("traveller-7").await?;
//! assert_eq!(summary.trips.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod accounting;
pub mod error;
pub mod event;
pub mod fingerprint;
pub mod queue;
pub mod reconcile;
pub mod remote;
pub mod snapshot;
pub mod store;
pub mod sync;
pub mod trips;

// Re-export main types at crate root
pub use accounting::{PresenceStatus, Summary};
pub use error::Error;
pub use event::{Event, EventKind, EventOrigin, EventPatch, NewEvent, RemoteEvent, SyncMarker};
pub use fingerprint::Fingerprint;
pub use queue::{QueueEntry, QueueIntent};
pub use reconcile::ReconcileOutcome;
pub use remote::{InMemoryRemote, RemoteStore, RemoteStoreError};
pub use snapshot::{Snapshot, SNAPSHOT_FORMAT_VERSION};
pub use store::{LocalStore, MemoryStore, StoreError};
pub use sync::{SyncEngine, SyncStatus};
pub use trips::{Anomaly, Trip};

/// Type aliases for clarity
pub type EventId = String;
pub type OwnerId = String;
