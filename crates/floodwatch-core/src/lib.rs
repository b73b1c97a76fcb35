//! Core domain logic for the floodwatch client: report types, the stream
//! message envelope, the keyed reconciliation store, and the map projection.
//!
//! Pure and deterministic: no IO, no async. Actual transports
//! (REST fetch, SSE stream) live in floodwatch-client.

pub mod message;
pub mod projection;
pub mod store;
pub mod types;

pub use message::{MessageError, StreamMessage, decode_message};
pub use projection::{MapProjection, MarkerSpec, MarkerSurface, SyncOutcome};
pub use store::{ReportStore, SnapshotOutcome, SubscriptionId, UpsertOutcome};
pub use types::{Coordinates, Report, Urgency, VoteKind};
