// Inbound channel events and payload decoding

use crate::state::{EntityId, LocationId, LocationSample};
use serde_json::Value;
use tracing::warn;

mod validation;

pub use validation::{expect_array, expect_fields, room_name, PayloadError};

/// Visits reported for one customer, in arrival order
#[derive(Clone, Debug, PartialEq)]
pub struct VisitGroup {
    pub entity_id: EntityId,
    pub locations: Vec<LocationId>,
}

/// Events accepted on the location channel
#[derive(Clone, Debug, PartialEq)]
pub enum LocationEvent {
    JoinRoom(String),
    LeaveRoom(String),
    Reset,
    Movement { entity_id: EntityId, delta: f64 },
    Visits(Vec<VisitGroup>),
    Samples(Vec<LocationSample>),
    Custom(Value),
}

impl LocationEvent {
    /// Decode a location channel event.
    ///
    /// Batches (`data`, `retailers_visited`) are decoded element by element:
    /// a malformed element is logged and dropped, the rest of the batch is kept.
    pub fn decode(event: &str, data: Value) -> Result<Self, PayloadError> {
        match event {
            "room" => Ok(LocationEvent::JoinRoom(room_name(&data)?)),
            "leave_room" => Ok(LocationEvent::LeaveRoom(room_name(&data)?)),
            "reset_server_data" => Ok(LocationEvent::Reset),
            "movement_km" => decode_movement(data),
            "retailers_visited" => decode_visits(data).map(LocationEvent::Visits),
            "data" => decode_samples(data).map(LocationEvent::Samples),
            "custom_event" => Ok(LocationEvent::Custom(data)),
            other => Err(PayloadError::UnknownEvent(other.to_string())),
        }
    }
}

/// Events accepted on the workbench channel
#[derive(Clone, Debug, PartialEq)]
pub enum WorkbenchEvent {
    JoinRoom(String),
    LeaveRoom(String),
    Data { room: String, msg: Value },
}

impl WorkbenchEvent {
    pub fn decode(event: &str, data: Value) -> Result<Self, PayloadError> {
        match event {
            "room" => Ok(WorkbenchEvent::JoinRoom(room_name(&data)?)),
            "leave_room" => Ok(WorkbenchEvent::LeaveRoom(room_name(&data)?)),
            "data" => {
                let room = data.get("room").ok_or(PayloadError::MissingField("room"))?;
                let room = room_name(room)?;
                let msg = data.get("msg").cloned().unwrap_or(Value::Null);
                Ok(WorkbenchEvent::Data { room, msg })
            }
            other => Err(PayloadError::UnknownEvent(other.to_string())),
        }
    }
}

/// Events accepted on experiment-stage channels
#[derive(Clone, Debug, PartialEq)]
pub enum StageEvent {
    Data(Value),
}

impl StageEvent {
    pub fn decode(event: &str, data: Value) -> Result<Self, PayloadError> {
        match event {
            "data" => Ok(StageEvent::Data(data)),
            other => Err(PayloadError::UnknownEvent(other.to_string())),
        }
    }
}

/// `[entity_id, delta]`
fn decode_movement(data: Value) -> Result<LocationEvent, PayloadError> {
    let fields = expect_fields(data, "movement", 2)?;
    let entity_id = EntityId::from_value(&fields[0])?;
    let delta = fields[1]
        .as_f64()
        .ok_or_else(|| PayloadError::InvalidDistance(fields[1].to_string()))?;
    Ok(LocationEvent::Movement { entity_id, delta })
}

/// `[[entity_id, location_id], ...]`, grouped per customer in first-seen order
fn decode_visits(data: Value) -> Result<Vec<VisitGroup>, PayloadError> {
    let pairs = expect_array(data, "visit list")?;
    let mut groups: Vec<VisitGroup> = Vec::new();

    for pair in pairs {
        let (entity_id, location) = match decode_visit(pair) {
            Ok(visit) => visit,
            Err(e) => {
                warn!(error = %e, "Dropping malformed visit");
                continue;
            }
        };

        match groups.iter_mut().find(|g| g.entity_id == entity_id) {
            Some(group) => group.locations.push(location),
            None => groups.push(VisitGroup {
                entity_id,
                locations: vec![location],
            }),
        }
    }

    Ok(groups)
}

fn decode_visit(pair: Value) -> Result<(EntityId, LocationId), PayloadError> {
    let mut fields = expect_fields(pair, "visit", 2)?;
    let entity_id = EntityId::from_value(&fields[0])?;
    Ok((entity_id, fields.swap_remove(1)))
}

fn decode_samples(data: Value) -> Result<Vec<LocationSample>, PayloadError> {
    let items = expect_array(data, "sample batch")?;
    let mut samples = Vec::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        match LocationSample::from_value(item) {
            Ok(sample) => samples.push(sample),
            Err(e) => warn!(index = index, error = %e, "Dropping malformed location sample"),
        }
    }

    Ok(samples)
}
