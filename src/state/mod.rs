// Per-customer location state and daily aggregates

mod aggregates;
mod directory;
mod engine;
mod sample;
mod store;

pub use aggregates::{AggregateTracker, GlobalAggregates, LocationId};
pub use directory::EntityDirectory;
pub use engine::{CustomerView, LocationEngine};
pub use sample::{EntityId, LocationSample, Marker, CORRECTION_MARKER};
pub use store::{EntityStateStore, IngestOutcome};
