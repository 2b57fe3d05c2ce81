//! Realtime event definitions.
//!
//! Both directions are closed unions: every event the client emits or
//! understands has exactly one variant with a typed payload. On the wire an
//! event is a name plus an optional JSON payload ([`EventFrame`]), which is
//! what the Socket.IO codec carries.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::models::{
    ChatMessage, EntityId, MessageEnvelope, Product, ProductRef, QuantityUpdate, ReadMarker,
    ReadReceipt, Rental, TypingUpdate,
};

const TAG: &str = "event";
const CONTENT: &str = "data";

/// A named event with its raw payload, as exchanged with the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EventFrame {
    pub name: String,
    pub data: Option<Value>,
}

impl EventFrame {
    pub fn new(name: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Events sent from the client to the realtime server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinConversation(EntityId),
    LeaveConversation(EntityId),
    JoinRental(EntityId),
    LeaveRental(EntityId),
    JoinProduct(EntityId),
    LeaveProduct(EntityId),
    SendMessage(MessageEnvelope),
    TypingStart(EntityId),
    TypingStop(EntityId),
    MessageRead(ReadMarker),
    /// Presence announcement sent right after every successful handshake.
    UserOnline,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinConversation(_) => "join_conversation",
            ClientEvent::LeaveConversation(_) => "leave_conversation",
            ClientEvent::JoinRental(_) => "join_rental",
            ClientEvent::LeaveRental(_) => "leave_rental",
            ClientEvent::JoinProduct(_) => "join_product",
            ClientEvent::LeaveProduct(_) => "leave_product",
            ClientEvent::SendMessage(_) => "send_message",
            ClientEvent::TypingStart(_) => "typing_start",
            ClientEvent::TypingStop(_) => "typing_stop",
            ClientEvent::MessageRead(_) => "message_read",
            ClientEvent::UserOnline => "user_online",
        }
    }

    pub fn to_frame(&self) -> ProtocolResult<EventFrame> {
        into_frame(self)
    }

    pub fn from_frame(frame: EventFrame) -> ProtocolResult<Self> {
        let EventFrame { name, data } = frame;
        // Unit variants must not carry a content key at all.
        let data = data.filter(|value| !value.is_null());
        from_tagged(name, data)
    }
}

/// Events pushed by the realtime server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    NewMessage(ChatMessage),
    UserTyping(TypingUpdate),
    MessageReadReceipt(ReadReceipt),
    RentalUpdated(Rental),
    RentalCreated(Rental),
    ProductUpdated(Product),
    ProductCreated(Product),
    ProductDeleted(ProductRef),
    QuantityUpdated(QuantityUpdate),
    NewNotification(Value),
    SystemAlert(Value),
    RefreshConversations(Value),
    UserStatusChanged(Value),
    UserUpdated(Value),
    ReviewCreated(Value),
    ReviewUpdated(Value),
    ReviewDeleted(Value),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::UserTyping(_) => EventKind::UserTyping,
            ServerEvent::MessageReadReceipt(_) => EventKind::MessageReadReceipt,
            ServerEvent::RentalUpdated(_) => EventKind::RentalUpdated,
            ServerEvent::RentalCreated(_) => EventKind::RentalCreated,
            ServerEvent::ProductUpdated(_) => EventKind::ProductUpdated,
            ServerEvent::ProductCreated(_) => EventKind::ProductCreated,
            ServerEvent::ProductDeleted(_) => EventKind::ProductDeleted,
            ServerEvent::QuantityUpdated(_) => EventKind::QuantityUpdated,
            ServerEvent::NewNotification(_) => EventKind::NewNotification,
            ServerEvent::SystemAlert(_) => EventKind::SystemAlert,
            ServerEvent::RefreshConversations(_) => EventKind::RefreshConversations,
            ServerEvent::UserStatusChanged(_) => EventKind::UserStatusChanged,
            ServerEvent::UserUpdated(_) => EventKind::UserUpdated,
            ServerEvent::ReviewCreated(_) => EventKind::ReviewCreated,
            ServerEvent::ReviewUpdated(_) => EventKind::ReviewUpdated,
            ServerEvent::ReviewDeleted(_) => EventKind::ReviewDeleted,
        }
    }

    pub fn to_frame(&self) -> ProtocolResult<EventFrame> {
        into_frame(self)
    }

    /// Decode a pushed frame. Names outside [`EventKind`] are rejected with
    /// [`ProtocolError::UnknownEvent`] so the caller can log and skip them.
    pub fn from_frame(frame: EventFrame) -> ProtocolResult<Self> {
        let EventFrame { name, data } = frame;
        if EventKind::from_name(&name).is_none() {
            return Err(ProtocolError::UnknownEvent(name));
        }
        from_tagged(name, Some(data.unwrap_or(Value::Null)))
    }
}

/// Registry key for inbound events; one per [`ServerEvent`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    NewMessage,
    UserTyping,
    MessageReadReceipt,
    RentalUpdated,
    RentalCreated,
    ProductUpdated,
    ProductCreated,
    ProductDeleted,
    QuantityUpdated,
    NewNotification,
    SystemAlert,
    RefreshConversations,
    UserStatusChanged,
    UserUpdated,
    ReviewCreated,
    ReviewUpdated,
    ReviewDeleted,
}

impl EventKind {
    pub const ALL: [EventKind; 17] = [
        EventKind::NewMessage,
        EventKind::UserTyping,
        EventKind::MessageReadReceipt,
        EventKind::RentalUpdated,
        EventKind::RentalCreated,
        EventKind::ProductUpdated,
        EventKind::ProductCreated,
        EventKind::ProductDeleted,
        EventKind::QuantityUpdated,
        EventKind::NewNotification,
        EventKind::SystemAlert,
        EventKind::RefreshConversations,
        EventKind::UserStatusChanged,
        EventKind::UserUpdated,
        EventKind::ReviewCreated,
        EventKind::ReviewUpdated,
        EventKind::ReviewDeleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::NewMessage => "new_message",
            EventKind::UserTyping => "user_typing",
            EventKind::MessageReadReceipt => "message_read_receipt",
            EventKind::RentalUpdated => "rental_updated",
            EventKind::RentalCreated => "rental_created",
            EventKind::ProductUpdated => "product_updated",
            EventKind::ProductCreated => "product_created",
            EventKind::ProductDeleted => "product_deleted",
            EventKind::QuantityUpdated => "quantity_updated",
            EventKind::NewNotification => "new_notification",
            EventKind::SystemAlert => "system_alert",
            EventKind::RefreshConversations => "refresh_conversations",
            EventKind::UserStatusChanged => "user_status_changed",
            EventKind::UserUpdated => "user_updated",
            EventKind::ReviewCreated => "review_created",
            EventKind::ReviewUpdated => "review_updated",
            EventKind::ReviewDeleted => "review_deleted",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn into_frame<T: Serialize>(event: &T) -> ProtocolResult<EventFrame> {
    let mut tagged = match serde_json::to_value(event)? {
        Value::Object(map) => map,
        other => {
            return Err(ProtocolError::Malformed(format!(
                "event serialized to non-object {other}"
            )))
        }
    };
    let name = match tagged.remove(TAG) {
        Some(Value::String(name)) => name,
        _ => return Err(ProtocolError::Malformed("event without a name".to_string())),
    };
    Ok(EventFrame {
        name,
        data: tagged.remove(CONTENT),
    })
}

fn from_tagged<T: DeserializeOwned>(name: String, data: Option<Value>) -> ProtocolResult<T> {
    let mut tagged = Map::new();
    tagged.insert(TAG.to_string(), Value::String(name.clone()));
    if let Some(data) = data {
        tagged.insert(CONTENT.to_string(), data);
    }
    serde_json::from_value(Value::Object(tagged))
        .map_err(|source| ProtocolError::Payload { event: name, source })
}
