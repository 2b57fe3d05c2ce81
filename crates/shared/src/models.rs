//! Shared data models for the marketplace realtime protocol.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

// --- Identity ---

/// A server-assigned identifier.
///
/// The backend mixes numeric primary keys and string ids, so both are
/// accepted on the wire and normalized to their decimal/string form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(text) => EntityId(text),
            Raw::Signed(n) => EntityId(n.to_string()),
            Raw::Unsigned(n) => EntityId(n.to_string()),
        })
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

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl PartialEq<str> for EntityId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for EntityId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// --- Messaging ---

/// Kind of chat message. Unknown kinds survive a round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    System,
    Other(String),
}

impl From<String> for MessageType {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "text" => MessageType::Text,
            "image" => MessageType::Image,
            "file" => MessageType::File,
            "system" => MessageType::System,
            _ => MessageType::Other(raw),
        }
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        match kind {
            MessageType::Text => "text".to_string(),
            MessageType::Image => "image".to_string(),
            MessageType::File => "file".to_string(),
            MessageType::System => "system".to_string(),
            MessageType::Other(raw) => raw,
        }
    }
}

/// A chat message as delivered by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(alias = "conversation_id")]
    pub conversation_id: EntityId,
    #[serde(default, alias = "sender_id", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<EntityId>,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "type", alias = "message_type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    #[serde(default, alias = "created_at", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Fields this client does not model (sender profile, read flags, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Canonical outbound chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub conversation_id: EntityId,
    pub content: String,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<String>,
    /// Client-generated nonce so callers can correlate the echo.
    pub client_nonce: String,
}

impl MessageEnvelope {
    pub fn new(
        conversation_id: EntityId,
        content: impl Into<String>,
        message_type: MessageType,
        attachment: Option<String>,
    ) -> Self {
        Self {
            conversation_id,
            content: content.into(),
            message_type,
            attachment,
            client_nonce: uuid::Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TypingUpdate {
    pub conversation_id: EntityId,
    pub user_id: EntityId,
    pub is_typing: bool,
}

/// Inbound read receipt. Passed through to callers unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub conversation_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<EntityId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Outbound read marker for a single message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReadMarker {
    pub conversation_id: EntityId,
    pub message_id: EntityId,
}

// --- Rentals ---

/// Full representation of a rental as pushed by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Rental {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    #[serde(default, alias = "rental_uid", skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rental_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Rental {
    /// True when `key` names this rental by numeric id or by UID.
    pub fn matches(&self, key: &str) -> bool {
        self.id.as_ref().is_some_and(|id| id == key) || self.uid.as_deref() == Some(key)
    }
}

// --- Products ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Product {
    #[serde(alias = "_id")]
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `product_deleted` carries either the deleted product or just its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ProductRef {
    Product(Product),
    Id(EntityId),
}

impl ProductRef {
    pub fn id(&self) -> &EntityId {
        match self {
            ProductRef::Product(product) => &product.id,
            ProductRef::Id(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuantityUpdate {
    #[serde(alias = "productId", alias = "id")]
    pub product_id: EntityId,
    pub quantity: i64,
}
