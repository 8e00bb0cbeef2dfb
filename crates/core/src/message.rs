//! Conversation history value objects.
//!
//! These are the immutable snapshots that flow from the transport layer into
//! the orchestrator: a `ChannelMessage` is one unit of history as fetched,
//! and a `ContextSnapshot` is the aggregated, bounded view assembled for a
//! single model invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a channel on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message on the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a platform user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single unit of conversation history.
///
/// Immutable snapshot value: owned by whoever fetched it, never mutated
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Platform message id
    pub id: MessageId,

    /// Human-readable author name
    pub author: String,

    /// The text content
    pub content: String,

    /// When the message was sent
    pub timestamp: DateTime<Utc>,

    /// Whether this message was authored by the bot itself
    #[serde(default)]
    pub from_bot: bool,

    /// URLs of attached images
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_urls: Vec<String>,

    /// The id of the message this one replies to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<MessageId>,
}

impl ChannelMessage {
    /// Render as `author: content`, the form used in prompt history blocks.
    pub fn render(&self) -> String {
        format!("{}: {}", self.author, self.content)
    }
}

/// The aggregated view passed to the orchestrator for one invocation.
///
/// Built fresh per invocation; never cached across invocations.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    /// Recent channel history, ordered oldest-first.
    pub history: Vec<ChannelMessage>,

    /// The reply chain leading to the trigger message (oldest-first),
    /// present only for direct-reply invocations.
    pub reply_chain: Option<Vec<ChannelMessage>>,

    /// Whether the invocation channel is a thread.
    pub in_thread: bool,

    /// Inline summaries of resolved external links, in encounter order.
    pub link_summaries: Vec<String>,
}

impl ContextSnapshot {
    /// Whether the given message id appears anywhere in this snapshot.
    ///
    /// The orchestrator uses this to validate model-supplied reply targets:
    /// an id the model was never shown is never honored.
    pub fn contains_message(&self, id: &MessageId) -> bool {
        self.history.iter().any(|m| &m.id == id)
            || self
                .reply_chain
                .as_ref()
                .is_some_and(|chain| chain.iter().any(|m| &m.id == id))
    }
}
