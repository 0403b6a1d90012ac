// Single-writer broadcast hub: channels, rooms and location state

mod channel;
mod rooms;
mod router;

pub use channel::{ChannelKind, ChannelRegistry, ChannelSpec, RegistryError};
pub use rooms::Rooms;
pub use router::Hub;

use crate::state::{CustomerView, EntityId, GlobalAggregates};
use crate::subscription::{ClientFrame, ServerMessage};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

#[cfg(test)]
mod tests;

/// Identity of one accepted socket
pub type ConnectionId = Uuid;

/// Per-connection queue of outbound messages
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Read-only questions answered by the hub
#[derive(Debug)]
pub enum StateQuery {
    Global(oneshot::Sender<GlobalAggregates>),
    CustomerList(oneshot::Sender<Value>),
    Customer {
        entity_id: EntityId,
        reply: oneshot::Sender<Option<CustomerView>>,
    },
}

/// Everything the hub reacts to, processed strictly one at a time
#[derive(Debug)]
pub enum HubCommand {
    Connect {
        channel: String,
        connection: ConnectionId,
        outbox: Outbox,
    },
    Disconnect {
        connection: ConnectionId,
    },
    Message {
        connection: ConnectionId,
        frame: ClientFrame,
    },
    NameResolved {
        entity_id: EntityId,
        name: String,
        epoch: u64,
    },
    ScheduledReset,
    Query(StateQuery),
}

/// Cloneable sender side of the hub's command queue
#[derive(Debug, Clone)]
pub struct HubHandle {
    tx: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    /// Create a handle and the receiver to pass to [`Hub::run`]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HubCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a command. Returns false once the hub has stopped.
    pub fn send(&self, command: HubCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    /// Ask the hub a question and wait for the answer.
    /// Returns None if the hub stopped before replying.
    pub async fn query<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> StateQuery) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        if !self.send(HubCommand::Query(build(reply))) {
            return None;
        }
        answer.await.ok()
    }
}
