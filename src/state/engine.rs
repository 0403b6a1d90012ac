use crate::state::aggregates::{AggregateTracker, GlobalAggregates, LocationId};
use crate::state::directory::EntityDirectory;
use crate::state::sample::{EntityId, LocationSample};
use crate::state::store::{EntityStateStore, IngestOutcome};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Everything known about one customer today
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CustomerView {
    pub history: Vec<LocationSample>,
    pub visited: Vec<LocationId>,
    pub distance: f64,
    pub name: Option<String>,
}

/// In-memory location state for one day.
///
/// Owns the sample store, the aggregate counters and the name directory,
/// and wipes all three together. The epoch counts resets so that name
/// lookups started before a reset can be recognised when they complete.
#[derive(Debug, Default)]
pub struct LocationEngine {
    store: EntityStateStore,
    aggregates: AggregateTracker,
    directory: EntityDirectory,
    epoch: u64,
}

impl LocationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest_batch(&mut self, samples: Vec<LocationSample>) -> IngestOutcome {
        let outcome = self.store.ingest_batch(samples);
        debug!(
            updated = outcome.updates.len(),
            new_entities = outcome.new_entities.len(),
            dropped = outcome.dropped,
            "Ingested sample batch"
        );
        outcome
    }

    pub fn record_distance(&mut self, entity_id: &EntityId, delta: f64) -> GlobalAggregates {
        self.aggregates.record_distance(entity_id, delta)
    }

    pub fn record_visits<I>(&mut self, entity_id: &EntityId, locations: I) -> GlobalAggregates
    where
        I: IntoIterator<Item = LocationId>,
    {
        self.aggregates.record_visits(entity_id, locations)
    }

    /// Store a resolved name. Returns false when the lookup was started
    /// before the most recent reset and the name was discarded.
    pub fn apply_name(&mut self, entity_id: EntityId, name: String, epoch: u64) -> bool {
        if epoch != self.epoch {
            debug!(entity_id = %entity_id, epoch = epoch, current = self.epoch, "Discarding stale name");
            return false;
        }
        self.directory.insert(entity_id, name);
        true
    }

    /// Wipe history, snapshots, ledgers, visits, counters and names
    pub fn reset(&mut self) {
        let entities = self.store.entity_count();
        self.store.reset();
        self.aggregates.reset();
        self.directory.clear();
        self.epoch += 1;
        info!(entities = entities, epoch = self.epoch, "Location state reset");
    }

    /// `customer_list` payload: `{ "<id>": [sample...], ... }`
    pub fn customer_list(&self) -> Value {
        let map: Map<String, Value> = self
            .store
            .all_latest()
            .iter()
            .map(|(id, sample)| (id.to_string(), sample.to_value()))
            .collect();
        Value::Object(map)
    }

    pub fn customer_view(&self, entity_id: &EntityId) -> Option<CustomerView> {
        let history = self.store.history(entity_id);
        if history.is_empty() {
            return None;
        }
        Some(CustomerView {
            history: history.to_vec(),
            visited: self
                .aggregates
                .visited(entity_id)
                .map(<[LocationId]>::to_vec)
                .unwrap_or_default(),
            distance: self.aggregates.distance(entity_id).unwrap_or(0.0),
            name: self.directory.name(entity_id).map(str::to_string),
        })
    }

    pub fn store(&self) -> &EntityStateStore {
        &self.store
    }

    pub fn aggregates(&self) -> &AggregateTracker {
        &self.aggregates
    }

    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}
