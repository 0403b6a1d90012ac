use crate::event::{expect_fields, PayloadError};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Terminal value that marks a sample as an amendment of the previous point
pub const CORRECTION_MARKER: &str = "null";

/// Minimum wire fields: entity id, metric, terminal marker
const MIN_SAMPLE_FIELDS: usize = 3;

/// Identifier of a tracked customer.
///
/// Clients send ids as strings or numbers; both normalise to the string
/// form, which is the state key and the name of the customer's room.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse an id from its JSON representation
    pub fn from_value(value: &Value) -> Result<Self, PayloadError> {
        match value {
            Value::String(s) if !s.is_empty() => Ok(Self(s.clone())),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(PayloadError::InvalidEntityId(other.to_string())),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Last field of a sample
#[derive(Clone, Debug, PartialEq)]
pub enum Marker {
    /// The string `"null"`: amend the latest point instead of adding one
    Correction,
    /// JSON `null`. Written onto amended snapshots; also a plain new point.
    Cleared,
    /// Any other value: a new point
    Point(Value),
}

impl Marker {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(ref s) if s == CORRECTION_MARKER => Marker::Correction,
            Value::Null => Marker::Cleared,
            other => Marker::Point(other),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Marker::Correction => Value::String(CORRECTION_MARKER.to_string()),
            Marker::Cleared => Value::Null,
            Marker::Point(v) => v.clone(),
        }
    }
}

/// One reported position for a customer.
///
/// Wire shape: `[entity_id, metric, ...payload, marker]`. Only the entity id,
/// the metric (field 1) and the marker are interpreted; the payload is kept
/// as-is and re-encoded in the same position.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationSample {
    pub entity_id: EntityId,
    /// Field 0 exactly as the client sent it
    pub id_value: Value,
    pub metric: Value,
    pub payload: Vec<Value>,
    pub marker: Marker,
}

impl LocationSample {
    pub fn is_correction(&self) -> bool {
        self.marker == Marker::Correction
    }

    /// Decode a sample from its JSON array form
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let mut fields = expect_fields(value, "location sample", MIN_SAMPLE_FIELDS)?;

        let marker = Marker::from_value(fields.pop().unwrap_or(Value::Null));
        let mut fields = fields.into_iter();
        let id_value = fields.next().unwrap_or(Value::Null);
        let entity_id = EntityId::from_value(&id_value)?;
        let metric = fields.next().unwrap_or(Value::Null);

        Ok(Self {
            entity_id,
            id_value,
            metric,
            payload: fields.collect(),
            marker,
        })
    }

    /// Take the correction's metric and clear the marker
    pub fn amend(&mut self, correction: &LocationSample) {
        self.metric = correction.metric.clone();
        self.marker = Marker::Cleared;
    }

    /// Number of fields in the wire form
    pub fn field_count(&self) -> usize {
        self.payload.len() + MIN_SAMPLE_FIELDS
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Vec::with_capacity(self.field_count());
        fields.push(self.id_value.clone());
        fields.push(self.metric.clone());
        fields.extend(self.payload.iter().cloned());
        fields.push(self.marker.to_value());
        Value::Array(fields)
    }
}

impl Serialize for LocationSample {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.field_count()))?;
        seq.serialize_element(&self.id_value)?;
        seq.serialize_element(&self.metric)?;
        for field in &self.payload {
            seq.serialize_element(field)?;
        }
        seq.serialize_element(&self.marker.to_value())?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for LocationSample {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        LocationSample::from_value(value).map_err(de::Error::custom)
    }
}
