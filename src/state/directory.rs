use crate::state::sample::EntityId;
use std::collections::BTreeMap;

/// Display names resolved for customers seen today
#[derive(Debug, Default)]
pub struct EntityDirectory {
    names: BTreeMap<EntityId, String>,
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a name; the last write for a customer wins
    pub fn insert(&mut self, entity_id: EntityId, name: String) -> Option<String> {
        self.names.insert(entity_id, name)
    }

    pub fn name(&self, entity_id: &EntityId) -> Option<&str> {
        self.names.get(entity_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// The directory as a JSON object encoded into a string.
    /// Dashboards parse `customer_names` themselves.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.names).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }
}
