//! Message list for a single conversation.
//!
//! Merges the REST history with pushed messages. A message can arrive both
//! ways (or be redelivered), so entries are de-duplicated by id and kept
//! sorted by `created_at` ascending.

use rentline_shared::ChatMessage;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ConversationMessages {
    /// All messages in this conversation, sorted by created_at ascending.
    pub messages: Vec<ChatMessage>,
    /// Whether the conversation history has been fetched from the REST API.
    pub is_loaded: bool,
}

impl ConversationMessages {
    /// Add a message, maintaining sort order by created_at.
    /// Returns false if a message with the same ID already exists.
    pub fn add_message(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        // Undated messages sort first; ties keep arrival order.
        let pos = self
            .messages
            .partition_point(|m| m.created_at <= msg.created_at);

        self.messages.insert(pos, msg);
        true
    }

    /// Replace the list with the REST history and mark it loaded. Messages
    /// pushed before the fetch resolved and missing from it are kept.
    pub fn set_history(&mut self, history: Vec<ChatMessage>) {
        let pushed = std::mem::take(&mut self.messages);
        for msg in history.into_iter().chain(pushed) {
            self.add_message(msg);
        }
        self.is_loaded = true;
    }

    /// Add every message, returning how many were new.
    pub fn merge<I>(&mut self, messages: I) -> usize
    where
        I: IntoIterator<Item = ChatMessage>,
    {
        messages
            .into_iter()
            .map(|msg| self.add_message(msg))
            .filter(|added| *added)
            .count()
    }
}
