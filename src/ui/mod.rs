//! Chat UI host primitives.
//!
//! The session handler renders through the [`ChatSink`] trait, which offers
//! exactly two operations: send a new message and update an existing one.
//! [`SessionChannel`] is the in-process implementation: it keeps the rendered
//! transcript of a session and fans every change out to SSE subscribers as a
//! [`UiEvent`].

pub mod channel;
pub mod page;
pub mod sse;

pub use channel::SessionChannel;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a rendered chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message as shown in the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiMessage {
    pub id: MessageId,
    /// Author label, e.g. `user` or `agent`.
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Change notifications pushed to chat clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum UiEvent {
    /// A new message was added to the chat.
    #[serde(rename = "message.created")]
    MessageCreated(UiMessage),
    /// The content of an existing message was replaced.
    #[serde(rename = "message.updated")]
    MessageUpdated {
        id: MessageId,
        content: String,
    },
}

impl UiEvent {
    /// SSE event name for this notification.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "message.created",
            Self::MessageUpdated { .. } => "message.updated",
        }
    }
}

/// Where the session handler renders its output.
pub trait ChatSink: Send + Sync {
    /// Show a new message and return its handle.
    fn send(&self, author: &str, content: &str) -> MessageId;

    /// Replace the content of a previously sent message.
    ///
    /// Returns `false` if the message is unknown.
    fn update(&self, id: &MessageId, content: &str) -> bool;
}
