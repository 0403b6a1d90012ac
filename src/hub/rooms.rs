use crate::hub::ConnectionId;
use std::collections::{HashMap, HashSet};

/// Room membership for one channel
#[derive(Debug, Default)]
pub struct Rooms {
    members: HashMap<String, HashSet<ConnectionId>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already in the room
    pub fn join(&mut self, room: &str, connection: ConnectionId) -> bool {
        self.members
            .entry(room.to_string())
            .or_default()
            .insert(connection)
    }

    /// Returns false if the connection was not in the room
    pub fn leave(&mut self, room: &str, connection: ConnectionId) -> bool {
        let Some(members) = self.members.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&connection);
        if members.is_empty() {
            self.members.remove(room);
        }
        removed
    }

    /// Drop a connection from every room
    pub fn remove_connection(&mut self, connection: ConnectionId) {
        self.members.retain(|_, members| {
            members.remove(&connection);
            !members.is_empty()
        });
    }

    pub fn members(&self, room: &str) -> impl Iterator<Item = &ConnectionId> {
        self.members.get(room).into_iter().flatten()
    }

    pub fn is_member(&self, room: &str, connection: ConnectionId) -> bool {
        self.members
            .get(room)
            .is_some_and(|members| members.contains(&connection))
    }

    pub fn room_count(&self) -> usize {
        self.members.len()
    }
}
