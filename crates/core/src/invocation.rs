//! Invocation request/result value objects.
//!
//! An `InvocationRequest` is created by the command layer when a message
//! triggers the bot; the orchestrator consumes it read-only and produces
//! exactly one `InvocationResult` for the transport layer to deliver.
//! Both live for a single invocation — no persistence.

use crate::message::{ChannelId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the bot came to be invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationKind {
    /// An explicit prefixed command.
    Command,
    /// The bot decided to chime in on ambient channel chatter.
    Ambient,
    /// The user replied directly to one of the bot's messages.
    DirectReply,
}

/// Everything the orchestrator needs to run one invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    /// The persona the bot speaks as.
    pub persona: String,

    /// Optional topic text supplied with the command.
    pub topic: Option<String>,

    /// The invoking user.
    pub user: UserId,

    /// The channel the invocation came from.
    pub channel: ChannelId,

    /// When the invocation was received.
    pub timestamp: DateTime<Utc>,

    /// What kind of invocation this is.
    pub kind: InvocationKind,

    /// Seed for reply-chain gathering (the message the user replied to).
    pub reply_seed: Option<MessageId>,

    /// The id of the message that triggered the invocation, if known.
    pub trigger: Option<MessageId>,
}

/// How a response should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Send as a plain channel message.
    Broadcast,
    /// Send as a reply to a specific message.
    Reply,
}

/// The delivery decision returned to the transport layer.
///
/// Produced once per invocation; immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    /// The response text, already scrubbed and length-capped.
    pub text: String,

    /// The message to reply to, when `mode` is `Reply`.
    pub reply_to: Option<MessageId>,

    /// Broadcast vs. targeted reply.
    pub mode: DeliveryMode,
}

impl InvocationResult {
    /// A plain broadcast message.
    pub fn broadcast(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reply_to: None,
            mode: DeliveryMode::Broadcast,
        }
    }

    /// A targeted reply to a specific message.
    pub fn reply(text: impl Into<String>, target: MessageId) -> Self {
        Self {
            text: text.into(),
            reply_to: Some(target),
            mode: DeliveryMode::Reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_has_no_target() {
        let result = InvocationResult::broadcast("hello");
        assert_eq!(result.mode, DeliveryMode::Broadcast);
        assert!(result.reply_to.is_none());
    }

    #[test]
    fn reply_carries_target() {
        let result = InvocationResult::reply("hi back", MessageId("77".into()));
        assert_eq!(result.mode, DeliveryMode::Reply);
        assert_eq!(result.reply_to, Some(MessageId("77".into())));
    }
}
