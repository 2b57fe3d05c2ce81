//! Realtime state for one open conversation view.

use std::collections::BTreeSet;
use std::sync::Arc;

use rentline_shared::{
    ChatMessage, ClientEvent, EntityId, EventKind, MessageEnvelope, MessageType, ReadMarker,
    ReadReceipt, ServerEvent, TypingUpdate,
};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use super::track_membership;
use crate::ws::{listener, Listener, RealtimeClient, Room};

/// What a conversation view renders from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Set once the join has been issued (joining is fire-and-forget).
    /// Cleared when the client forgets its rooms; see [`RealtimeChat::rejoin`].
    pub joined: bool,
    /// Pushed messages in arrival order. Redelivery is possible, so views
    /// de-duplicate by id (see [`crate::stores::ConversationMessages`]).
    pub messages: Vec<ChatMessage>,
    /// Users currently typing in this conversation.
    pub typing: BTreeSet<EntityId>,
}

impl ChatState {
    pub fn apply_message(&mut self, conversation_id: &EntityId, message: &ChatMessage) -> bool {
        if &message.conversation_id != conversation_id {
            return false;
        }
        self.messages.push(message.clone());
        true
    }

    /// Returns false when the update would not change the typing set.
    pub fn apply_typing(&mut self, conversation_id: &EntityId, update: &TypingUpdate) -> bool {
        if &update.conversation_id != conversation_id {
            return false;
        }
        if update.is_typing {
            self.typing.insert(update.user_id.clone())
        } else {
            self.typing.remove(&update.user_id)
        }
    }
}

/// A mounted chat view. Dropping it unmounts: the conversation room is left
/// and exactly the listeners registered here are removed.
pub struct RealtimeChat {
    client: RealtimeClient,
    conversation_id: EntityId,
    state: Arc<watch::Sender<ChatState>>,
    listeners: Vec<(EventKind, Listener)>,
    membership: AbortHandle,
}

impl RealtimeChat {
    pub fn mount(client: &RealtimeClient, conversation_id: impl Into<EntityId>) -> Self {
        Self::mount_with_receipts(client, conversation_id, |_: &ReadReceipt| {})
    }

    /// Mount and forward read receipts for this conversation to `on_receipt`
    /// untouched.
    pub fn mount_with_receipts<F>(
        client: &RealtimeClient,
        conversation_id: impl Into<EntityId>,
        on_receipt: F,
    ) -> Self
    where
        F: Fn(&ReadReceipt) + Send + Sync + 'static,
    {
        let conversation_id = conversation_id.into();
        let state = Arc::new(watch::channel(ChatState::default()).0);

        client.join(&Room::Conversation(conversation_id.clone()));
        state.send_modify(|s| s.joined = true);
        let membership = track_membership(client, &state, |s: &mut ChatState| {
            std::mem::replace(&mut s.joined, false)
        });

        let on_message = {
            let state = state.clone();
            let id = conversation_id.clone();
            listener(move |event| {
                if let ServerEvent::NewMessage(message) = event {
                    state.send_if_modified(|s| s.apply_message(&id, message));
                }
            })
        };

        let on_typing = {
            let state = state.clone();
            let id = conversation_id.clone();
            listener(move |event| {
                if let ServerEvent::UserTyping(update) = event {
                    state.send_if_modified(|s| s.apply_typing(&id, update));
                }
            })
        };

        let on_read = {
            let id = conversation_id.clone();
            listener(move |event| {
                if let ServerEvent::MessageReadReceipt(receipt) = event {
                    if receipt.conversation_id == id {
                        on_receipt(receipt);
                    }
                }
            })
        };

        let listeners = vec![
            (EventKind::NewMessage, on_message),
            (EventKind::UserTyping, on_typing),
            (EventKind::MessageReadReceipt, on_read),
        ];
        for (kind, l) in &listeners {
            client.on(*kind, l.clone());
        }

        crate::log_debug!("chat mounted for conversation {}", conversation_id);
        Self {
            client: client.clone(),
            conversation_id,
            state,
            listeners,
            membership,
        }
    }

    /// Join the conversation room again, e.g. after a dropped connection.
    pub fn rejoin(&self) {
        self.client
            .join(&Room::Conversation(self.conversation_id.clone()));
        self.state.send_modify(|s| s.joined = true);
    }

    pub fn conversation_id(&self) -> &EntityId {
        &self.conversation_id
    }

    /// Emit a message. Nothing is appended locally; the stored copy arrives
    /// as a `new_message` push. The envelope is returned for correlation.
    pub fn send_message(
        &self,
        content: impl Into<String>,
        message_type: MessageType,
        attachment: Option<String>,
    ) -> MessageEnvelope {
        let envelope = MessageEnvelope::new(
            self.conversation_id.clone(),
            content,
            message_type,
            attachment,
        );
        self.client
            .emit(ClientEvent::SendMessage(envelope.clone()));
        envelope
    }

    /// Callers debounce.
    pub fn start_typing(&self) {
        self.client
            .emit(ClientEvent::TypingStart(self.conversation_id.clone()));
    }

    pub fn stop_typing(&self) {
        self.client
            .emit(ClientEvent::TypingStop(self.conversation_id.clone()));
    }

    pub fn mark_read(&self, message_id: impl Into<EntityId>) {
        self.client.emit(ClientEvent::MessageRead(ReadMarker {
            conversation_id: self.conversation_id.clone(),
            message_id: message_id.into(),
        }));
    }

    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.borrow().messages.clone()
    }

    pub fn typing_users(&self) -> BTreeSet<EntityId> {
        self.state.borrow().typing.clone()
    }
}

impl Drop for RealtimeChat {
    fn drop(&mut self) {
        self.membership.abort();
        self.client
            .leave(&Room::Conversation(self.conversation_id.clone()));
        for (kind, l) in self.listeners.drain(..) {
            self.client.off(kind, Some(&l));
        }
        self.state.send_modify(|s| s.joined = false);
        crate::log_debug!("chat unmounted for conversation {}", self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, conversation: &str) -> ChatMessage {
        serde_json::from_value(serde_json::json!({
            "_id": id,
            "conversationId": conversation,
            "content": "hi",
        }))
        .unwrap()
    }

    fn typing(user: &str, is_typing: bool) -> TypingUpdate {
        TypingUpdate {
            conversation_id: "42".into(),
            user_id: user.into(),
            is_typing,
        }
    }

    #[test]
    fn messages_for_other_conversations_are_ignored() {
        let id = EntityId::from("42");
        let mut state = ChatState::default();
        assert!(state.apply_message(&id, &message("m1", "42")));
        assert!(!state.apply_message(&id, &message("m2", "7")));
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn redelivered_messages_are_kept() {
        let id = EntityId::from("42");
        let mut state = ChatState::default();
        state.apply_message(&id, &message("m1", "42"));
        state.apply_message(&id, &message("m1", "42"));
        assert_eq!(state.messages.len(), 2);
    }

    #[test]
    fn typing_set_only_changes_when_needed() {
        let id = EntityId::from("42");
        let mut state = ChatState::default();
        assert!(state.apply_typing(&id, &typing("5", true)));
        assert!(!state.apply_typing(&id, &typing("5", true)));
        assert_eq!(state.typing.len(), 1);
        assert!(state.apply_typing(&id, &typing("5", false)));
        assert!(!state.apply_typing(&id, &typing("5", false)));
        assert!(state.typing.is_empty());
    }
}
