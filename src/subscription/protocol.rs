use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Outbound event names
pub mod events {
    pub const HELLO: &str = "hello";
    pub const ACK: &str = "ack";
    pub const CUSTOMER_LIST: &str = "customer_list";
    pub const GLOBAL_PARAMS: &str = "global_params";
    pub const CUSTOMER_NAMES: &str = "customer_names";
    pub const CUSTOMER_DATA: &str = "customer_data";
    pub const RETAILERS_VISIT_CUSTOMER: &str = "retailers_visit_customer";
    pub const LATEST_DATA: &str = "latest_data";
    pub const DATA: &str = "data";
}

/// Client → Server frame
///
/// `{"event": "room", "data": "c1", "ack": 3}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    /// Request an `ack` reply carrying this id
    #[serde(default)]
    pub ack: Option<u64>,
}

impl ClientFrame {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
            ack: None,
        }
    }

    pub fn with_ack(mut self, id: u64) -> Self {
        self.ack = Some(id);
        self
    }
}

/// Server → Client frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    pub event: String,
    pub data: Value,
}

impl ServerMessage {
    pub fn new(event: &str, data: Value) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }

    pub fn ack(id: u64, ok: bool) -> Self {
        Self::new(events::ACK, json!({ "id": id, "ok": ok }))
    }
}
