//! Room membership. Joining is a plain emit, so it queues while offline and
//! joining the same room twice is harmless on the server.

use rentline_shared::{ClientEvent, EntityId};

use super::manager::RealtimeClient;

/// A server-side broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Conversation(EntityId),
    Rental(EntityId),
    Product(EntityId),
}

impl Room {
    pub fn join_event(&self) -> ClientEvent {
        match self {
            Room::Conversation(id) => ClientEvent::JoinConversation(id.clone()),
            Room::Rental(id) => ClientEvent::JoinRental(id.clone()),
            Room::Product(id) => ClientEvent::JoinProduct(id.clone()),
        }
    }

    pub fn leave_event(&self) -> ClientEvent {
        match self {
            Room::Conversation(id) => ClientEvent::LeaveConversation(id.clone()),
            Room::Rental(id) => ClientEvent::LeaveRental(id.clone()),
            Room::Product(id) => ClientEvent::LeaveProduct(id.clone()),
        }
    }
}

impl RealtimeClient {
    pub fn join(&self, room: &Room) {
        crate::log_debug!("joining {:?}", room);
        self.emit(room.join_event());
    }

    pub fn leave(&self, room: &Room) {
        crate::log_debug!("leaving {:?}", room);
        self.emit(room.leave_event());
    }

    pub fn join_conversation(&self, id: impl Into<EntityId>) {
        self.join(&Room::Conversation(id.into()));
    }

    pub fn leave_conversation(&self, id: impl Into<EntityId>) {
        self.leave(&Room::Conversation(id.into()));
    }

    pub fn join_rental(&self, id: impl Into<EntityId>) {
        self.join(&Room::Rental(id.into()));
    }

    pub fn leave_rental(&self, id: impl Into<EntityId>) {
        self.leave(&Room::Rental(id.into()));
    }

    pub fn join_product(&self, id: impl Into<EntityId>) {
        self.join(&Room::Product(id.into()));
    }

    pub fn leave_product(&self, id: impl Into<EntityId>) {
        self.leave(&Room::Product(id.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_events_carry_the_id() {
        let room = Room::Rental(EntityId::from("r-9"));
        assert_eq!(room.join_event(), ClientEvent::JoinRental("r-9".into()));
        assert_eq!(room.leave_event(), ClientEvent::LeaveRental("r-9".into()));
        assert_eq!(room.join_event().name(), "join_rental");
    }
}
