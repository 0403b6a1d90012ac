use crate::enrichment::NameLookup;
use crate::event::{LocationEvent, PayloadError, StageEvent, WorkbenchEvent};
use crate::hub::channel::{ChannelKind, ChannelRegistry};
use crate::hub::rooms::Rooms;
use crate::hub::{ConnectionId, HubCommand, Outbox, StateQuery};
use crate::state::{EntityId, GlobalAggregates, LocationEngine, LocationSample};
use crate::subscription::{events, ClientFrame, ServerMessage};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Connections and rooms of one channel
#[derive(Debug, Default)]
struct ChannelState {
    connections: HashSet<ConnectionId>,
    rooms: Rooms,
}

/// An open connection
#[derive(Debug)]
struct Session {
    channel: String,
    kind: ChannelKind,
    outbox: Outbox,
}

/// Owns all mutable state and performs all fan-out.
///
/// Commands are handled one at a time to completion, so location state,
/// rooms and connection sets never need locking.
pub struct Hub {
    registry: Arc<ChannelRegistry>,
    channels: HashMap<String, ChannelState>,
    sessions: HashMap<ConnectionId, Session>,
    engine: LocationEngine,
    lookup: Box<dyn NameLookup>,
}

impl Hub {
    pub fn new(registry: Arc<ChannelRegistry>, lookup: Box<dyn NameLookup>) -> Self {
        let channels = registry
            .iter()
            .map(|spec| (spec.name.clone(), ChannelState::default()))
            .collect();
        Self {
            registry,
            channels,
            sessions: HashMap::new(),
            engine: LocationEngine::new(),
            lookup,
        }
    }

    /// Drain the command queue until every handle is dropped
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
        info!(channels = self.registry.len(), "Hub running");
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        info!("Hub command queue closed, stopping");
    }

    /// Apply one command
    pub fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Connect {
                channel,
                connection,
                outbox,
            } => self.on_connect(channel, connection, outbox),
            HubCommand::Disconnect { connection } => self.on_disconnect(connection),
            HubCommand::Message { connection, frame } => self.on_message(connection, frame),
            HubCommand::NameResolved {
                entity_id,
                name,
                epoch,
            } => self.on_name_resolved(entity_id, name, epoch),
            HubCommand::ScheduledReset => {
                info!("Scheduled daily reset");
                self.reset_location_state();
            }
            HubCommand::Query(query) => self.on_query(query),
        }
    }

    pub fn engine(&self) -> &LocationEngine {
        &self.engine
    }

    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    fn on_connect(&mut self, channel: String, connection: ConnectionId, outbox: Outbox) {
        let Some(spec) = self.registry.get(&channel).cloned() else {
            warn!(channel = %channel, connection = %connection, "Connect to unknown channel ignored");
            return;
        };
        let Some(state) = self.channels.get_mut(&channel) else {
            return;
        };

        state.connections.insert(connection);
        self.sessions.insert(
            connection,
            Session {
                channel: channel.clone(),
                kind: spec.kind,
                outbox,
            },
        );
        info!(channel = %channel, connection = %connection, "Client connected");

        if let Some(banner) = spec.banner {
            self.emit_to_connection(connection, ServerMessage::new(events::HELLO, json!(banner)));
        }
        if spec.kind == ChannelKind::Location {
            for message in self.location_snapshot() {
                self.emit_to_connection(connection, message);
            }
        }
    }

    fn on_disconnect(&mut self, connection: ConnectionId) {
        let Some(session) = self.sessions.remove(&connection) else {
            return;
        };
        if let Some(state) = self.channels.get_mut(&session.channel) {
            state.connections.remove(&connection);
            state.rooms.remove_connection(connection);
        }
        info!(channel = %session.channel, connection = %connection, "Client disconnected");
    }

    fn on_message(&mut self, connection: ConnectionId, frame: ClientFrame) {
        let Some(session) = self.sessions.get(&connection) else {
            warn!(connection = %connection, event = %frame.event, "Message from unknown connection ignored");
            return;
        };
        let channel = session.channel.clone();
        let kind = session.kind;
        let ClientFrame { event, data, ack } = frame;
        debug!(channel = %channel, connection = %connection, event = %event, "Message received");

        let result = match kind {
            ChannelKind::Location => LocationEvent::decode(&event, data)
                .map(|e| self.on_location_event(&channel, connection, e)),
            ChannelKind::Workbench => WorkbenchEvent::decode(&event, data)
                .map(|e| self.on_workbench_event(&channel, connection, e)),
            ChannelKind::Stage => {
                StageEvent::decode(&event, data).map(|e| self.on_stage_event(&channel, e))
            }
        };

        if let Err(e) = &result {
            log_dropped(&channel, connection, &event, e);
        }
        if let Some(id) = ack {
            self.emit_to_connection(connection, ServerMessage::ack(id, result.is_ok()));
        }
    }

    fn on_location_event(&mut self, channel: &str, connection: ConnectionId, event: LocationEvent) {
        match event {
            LocationEvent::JoinRoom(room) => {
                self.join_room(channel, connection, &room);
                for message in self.room_snapshot(&EntityId::new(room)) {
                    self.emit_to_connection(connection, message);
                }
            }
            LocationEvent::LeaveRoom(room) => self.leave_room(channel, connection, &room),
            LocationEvent::Reset => {
                info!(connection = %connection, "Reset requested by client");
                self.reset_location_state();
            }
            LocationEvent::Movement { entity_id, delta } => {
                let global = self.engine.record_distance(&entity_id, delta);
                self.emit_to_channel(channel, global_params(global));
            }
            LocationEvent::Visits(groups) => {
                let before = self.engine.aggregates().snapshot();
                let mut global = before;
                for group in groups {
                    global = self.engine.record_visits(&group.entity_id, group.locations);
                }
                if global.retailers_visited != before.retailers_visited {
                    self.emit_to_channel(channel, global_params(global));
                }
            }
            LocationEvent::Samples(samples) => self.ingest(channel, samples),
            LocationEvent::Custom(payload) => {
                info!(connection = %connection, payload = %payload, "Custom event");
            }
        }
    }

    fn ingest(&mut self, channel: &str, samples: Vec<LocationSample>) {
        let received = samples.len();
        let outcome = self.engine.ingest_batch(samples);
        debug!(received = received, updated = outcome.updates.len(), "Sample batch processed");

        for entity_id in &outcome.new_entities {
            self.lookup.request(entity_id, self.engine.epoch());
        }
        // Corrections for customers with no snapshot are dropped silently
        if outcome.updates.is_empty() && outcome.dropped > 0 {
            return;
        }
        for sample in &outcome.updates {
            self.emit_to_room(
                channel,
                sample.entity_id.as_str(),
                ServerMessage::new(events::LATEST_DATA, sample.to_value()),
            );
        }
        self.emit_to_channel(
            channel,
            ServerMessage::new(events::CUSTOMER_LIST, self.engine.customer_list()),
        );
    }

    fn on_workbench_event(&mut self, channel: &str, connection: ConnectionId, event: WorkbenchEvent) {
        match event {
            WorkbenchEvent::JoinRoom(room) => self.join_room(channel, connection, &room),
            WorkbenchEvent::LeaveRoom(room) => self.leave_room(channel, connection, &room),
            WorkbenchEvent::Data { room, msg } => {
                self.emit_to_room(channel, &room, ServerMessage::new(events::LATEST_DATA, msg));
            }
        }
    }

    fn on_stage_event(&mut self, channel: &str, event: StageEvent) {
        match event {
            StageEvent::Data(payload) => {
                self.emit_to_channel(channel, ServerMessage::new(events::DATA, payload));
            }
        }
    }

    fn on_name_resolved(&mut self, entity_id: EntityId, name: String, epoch: u64) {
        if !self.engine.apply_name(entity_id, name, epoch) {
            return;
        }
        let location = self.registry.location().to_string();
        self.emit_to_channel(&location, self.customer_names());
    }

    fn on_query(&self, query: StateQuery) {
        // A dropped receiver means the caller gave up; nothing to do.
        match query {
            StateQuery::Global(reply) => {
                let _ = reply.send(self.engine.aggregates().snapshot());
            }
            StateQuery::CustomerList(reply) => {
                let _ = reply.send(self.engine.customer_list());
            }
            StateQuery::Customer { entity_id, reply } => {
                let _ = reply.send(self.engine.customer_view(&entity_id));
            }
        }
    }

    /// Wipe the location state and push the empty state to every dashboard
    fn reset_location_state(&mut self) {
        self.engine.reset();
        let location = self.registry.location().to_string();
        for message in self.location_snapshot() {
            self.emit_to_channel(&location, message);
        }
    }

    fn join_room(&mut self, channel: &str, connection: ConnectionId, room: &str) {
        if let Some(state) = self.channels.get_mut(channel) {
            if state.rooms.join(room, connection) {
                info!(channel = %channel, connection = %connection, room = %room, "Joined room");
            }
        }
    }

    fn leave_room(&mut self, channel: &str, connection: ConnectionId, room: &str) {
        if let Some(state) = self.channels.get_mut(channel) {
            if state.rooms.leave(room, connection) {
                info!(channel = %channel, connection = %connection, room = %room, "Left room");
            }
        }
    }

    /// `customer_list`, `global_params`, `customer_names`
    fn location_snapshot(&self) -> [ServerMessage; 3] {
        [
            ServerMessage::new(events::CUSTOMER_LIST, self.engine.customer_list()),
            global_params(self.engine.aggregates().snapshot()),
            self.customer_names(),
        ]
    }

    /// `customer_data` and, if the customer has visits, `retailers_visit_customer`
    fn room_snapshot(&self, entity_id: &EntityId) -> Vec<ServerMessage> {
        let history: Vec<Value> = self
            .engine
            .store()
            .history(entity_id)
            .iter()
            .map(LocationSample::to_value)
            .collect();
        let mut messages = vec![ServerMessage::new(events::CUSTOMER_DATA, Value::Array(history))];

        if let Some(visited) = self.engine.aggregates().visited(entity_id) {
            messages.push(ServerMessage::new(
                events::RETAILERS_VISIT_CUSTOMER,
                Value::Array(visited.to_vec()),
            ));
        }
        messages
    }

    fn customer_names(&self) -> ServerMessage {
        ServerMessage::new(
            events::CUSTOMER_NAMES,
            Value::String(self.engine.directory().to_json_string()),
        )
    }

    fn emit_to_connection(&self, connection: ConnectionId, message: ServerMessage) {
        if let Some(session) = self.sessions.get(&connection) {
            // Closed outboxes belong to sockets that are shutting down
            let _ = session.outbox.send(message);
        }
    }

    fn emit_to_room(&self, channel: &str, room: &str, message: ServerMessage) {
        let Some(state) = self.channels.get(channel) else {
            return;
        };
        for connection in state.rooms.members(room) {
            self.emit_to_connection(*connection, message.clone());
        }
    }

    fn emit_to_channel(&self, channel: &str, message: ServerMessage) {
        let Some(state) = self.channels.get(channel) else {
            return;
        };
        for connection in &state.connections {
            self.emit_to_connection(*connection, message.clone());
        }
    }
}

fn global_params(global: GlobalAggregates) -> ServerMessage {
    ServerMessage::new(events::GLOBAL_PARAMS, json!(global))
}

fn log_dropped(channel: &str, connection: ConnectionId, event: &str, error: &PayloadError) {
    match error {
        PayloadError::UnknownEvent(_) => {
            debug!(channel = %channel, connection = %connection, event = %event, "Ignoring unknown event");
        }
        _ => {
            warn!(channel = %channel, connection = %connection, event = %event, error = %error, "Dropping malformed message");
        }
    }
}
