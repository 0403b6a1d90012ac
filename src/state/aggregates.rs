use crate::state::sample::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Retailer (or any visited place) identifier, compared by exact equality
pub type LocationId = Value;

/// Counters shared across all customers
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalAggregates {
    pub overall_distance: f64,
    /// Total distinct-per-customer visits, not distinct retailers
    pub retailers_visited: u64,
}

/// Running distance and visit statistics
#[derive(Debug, Default)]
pub struct AggregateTracker {
    distance: HashMap<EntityId, f64>,
    visited: HashMap<EntityId, Vec<LocationId>>,
    global: GlobalAggregates,
}

impl AggregateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reported delta to the customer's ledger and the overall total.
    /// Deltas are taken as given, including negative ones.
    pub fn record_distance(&mut self, entity_id: &EntityId, delta: f64) -> GlobalAggregates {
        *self.distance.entry(entity_id.clone()).or_insert(0.0) += delta;
        self.global.overall_distance += delta;
        self.global
    }

    /// Insert visits not already recorded for the customer.
    ///
    /// Each successful insert counts once towards `retailers_visited`;
    /// duplicates inside the same call are suppressed as the set grows.
    pub fn record_visits<I>(&mut self, entity_id: &EntityId, locations: I) -> GlobalAggregates
    where
        I: IntoIterator<Item = LocationId>,
    {
        let visited = self.visited.entry(entity_id.clone()).or_default();
        for location in locations {
            if !visited.contains(&location) {
                visited.push(location);
                self.global.retailers_visited += 1;
            }
        }
        self.global
    }

    pub fn distance(&self, entity_id: &EntityId) -> Option<f64> {
        self.distance.get(entity_id).copied()
    }

    /// Visited locations in first-visit order, if the customer has any
    pub fn visited(&self, entity_id: &EntityId) -> Option<&[LocationId]> {
        self.visited
            .get(entity_id)
            .filter(|v| !v.is_empty())
            .map(Vec::as_slice)
    }

    pub fn snapshot(&self) -> GlobalAggregates {
        self.global
    }

    pub fn reset(&mut self) {
        self.distance.clear();
        self.visited.clear();
        self.global = GlobalAggregates::default();
    }
}
