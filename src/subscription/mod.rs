// WebSocket connection pump and wire protocol

pub mod manager;
pub mod protocol;

pub use manager::ConnectionManager;
pub use protocol::{events, ClientFrame, ServerMessage};
