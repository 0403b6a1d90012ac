use crate::state::sample::{EntityId, LocationSample};
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Result of ingesting one batch of samples
#[derive(Debug, Default, PartialEq)]
pub struct IngestOutcome {
    /// Samples to emit to each customer's room, in input order
    pub updates: Vec<LocationSample>,
    /// Customers seen for the first time since the last reset, in input order
    pub new_entities: Vec<EntityId>,
    /// Corrections dropped because the customer had no snapshot yet
    pub dropped: usize,
}

/// Per-customer latest snapshot and today's history.
///
/// The latest snapshot is always the last history entry. A correction edits
/// that snapshot, so every trailing history entry that is the same snapshot
/// (the point plus the corrections already re-appended after it) changes too.
#[derive(Debug, Default)]
pub struct EntityStateStore {
    history: HashMap<EntityId, Vec<LocationSample>>,
    latest: BTreeMap<EntityId, LocationSample>,
    /// Length of the trailing run of history entries equal to the latest snapshot
    shared_tail: HashMap<EntityId, usize>,
}

impl EntityStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply samples in input order.
    ///
    /// Every accepted sample appends exactly one history entry. A correction
    /// amends the latest snapshot in place and re-appends it rather than itself.
    pub fn ingest_batch(&mut self, samples: Vec<LocationSample>) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();

        for sample in samples {
            if sample.is_correction() {
                match self.apply_correction(&sample) {
                    Some(amended) => outcome.updates.push(amended),
                    None => {
                        debug!(entity_id = %sample.entity_id, "Correction without prior snapshot, dropped");
                        outcome.dropped += 1;
                    }
                }
                continue;
            }

            let entity_id = sample.entity_id.clone();
            match self.history.entry(entity_id.clone()) {
                Entry::Occupied(mut history) => history.get_mut().push(sample.clone()),
                Entry::Vacant(slot) => {
                    slot.insert(vec![sample.clone()]);
                    outcome.new_entities.push(entity_id.clone());
                }
            }
            self.shared_tail.insert(entity_id.clone(), 1);
            self.latest.insert(entity_id, sample.clone());
            outcome.updates.push(sample);
        }

        outcome
    }

    fn apply_correction(&mut self, correction: &LocationSample) -> Option<LocationSample> {
        let history = self.history.get_mut(&correction.entity_id)?;
        let shared = self
            .shared_tail
            .entry(correction.entity_id.clone())
            .or_insert(1);

        let start = history.len().saturating_sub(*shared);
        for entry in &mut history[start..] {
            entry.amend(correction);
        }
        let amended = history.last()?.clone();
        history.push(amended.clone());
        *shared += 1;

        self.latest
            .insert(correction.entity_id.clone(), amended.clone());
        Some(amended)
    }

    /// Today's history for a customer (empty if unseen)
    pub fn history(&self, entity_id: &EntityId) -> &[LocationSample] {
        self.history
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Latest snapshot for every customer, ordered by id
    pub fn all_latest(&self) -> &BTreeMap<EntityId, LocationSample> {
        &self.latest
    }

    pub fn latest(&self, entity_id: &EntityId) -> Option<&LocationSample> {
        self.latest.get(entity_id)
    }

    pub fn entity_count(&self) -> usize {
        self.latest.len()
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.latest.clear();
        self.shared_tail.clear();
    }
}
