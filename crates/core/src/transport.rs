//! TransportClient trait — the abstraction over the chat platform.
//!
//! The context aggregator reads history and reply chains through this seam.
//! Sending messages is not part of it: delivery is the hosting application's
//! job, driven by the `InvocationResult` the orchestrator returns.

use crate::error::TransportError;
use crate::message::{ChannelId, ChannelMessage, MessageId};
use async_trait::async_trait;

/// Read-only view of the chat platform.
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// Fetch up to `limit` recent messages from a channel, most-recent-first.
    async fn fetch_history(
        &self,
        channel: &ChannelId,
        limit: usize,
    ) -> std::result::Result<Vec<ChannelMessage>, TransportError>;

    /// Fetch a single message by id. Returns `Ok(None)` when the message no
    /// longer exists (deleted, or outside retention).
    async fn fetch_message(
        &self,
        channel: &ChannelId,
        id: &MessageId,
    ) -> std::result::Result<Option<ChannelMessage>, TransportError>;

    /// Whether the given channel is a thread.
    async fn is_thread(&self, channel: &ChannelId) -> std::result::Result<bool, TransportError>;
}
