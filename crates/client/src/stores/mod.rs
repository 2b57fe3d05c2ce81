//! Client-side stores that outlive a single push.

pub mod messages;

pub use messages::ConversationMessages;
