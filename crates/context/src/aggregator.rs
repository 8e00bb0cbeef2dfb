//! Context assembly — history and reply-chain aggregation.
//!
//! Builds an immutable `ContextSnapshot` per invocation:
//!
//! 1. **History window** — a bounded fetch of recent channel messages,
//!    reordered oldest-first, with overused and command-prefixed lines
//!    filtered out and the whole window clipped to a character budget.
//! 2. **Reply chain** — for direct-reply invocations, the `reply_to` chain
//!    walked upward from the trigger, bounded in depth.
//! 3. **Links** — recognized URLs resolved to short inline summaries, each
//!    under its own timeout.
//!
//! Pure read + transform: the aggregator never mutates memory or safety
//! state.

use crate::links::{LinkResolver, extract_urls};
use skylark_core::error::Error;
use skylark_core::invocation::{InvocationKind, InvocationRequest};
use skylark_core::message::{ChannelMessage, ContextSnapshot, MessageId};
use skylark_core::transport::TransportClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tunables for context assembly. Defaults match production settings.
#[derive(Debug, Clone)]
pub struct AggregatorOptions {
    /// How many recent messages to fetch.
    pub history_limit: usize,

    /// Maximum reply-chain depth.
    pub reply_depth: usize,

    /// Per-message content truncation budget, in characters.
    pub message_char_limit: usize,

    /// Total character budget for the rendered history window.
    pub history_char_budget: usize,

    /// A human line quoted this many times in bot output is dropped from
    /// history, so the bot stops parroting it.
    pub reuse_limit: usize,

    /// Command prefix; prefixed messages are never part of history.
    pub command_prefix: String,

    /// Per-link resolution timeout.
    pub link_timeout: Duration,

    /// Resolve at most this many links per snapshot.
    pub max_links: usize,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            history_limit: 50,
            reply_depth: 40,
            message_char_limit: 500,
            history_char_budget: 10_000,
            reuse_limit: 2,
            command_prefix: "!".into(),
            link_timeout: Duration::from_secs(3),
            max_links: 3,
        }
    }
}

/// Stateless aggregation logic over transport-fetched data.
pub struct ContextAggregator {
    transport: Arc<dyn TransportClient>,
    resolver: Option<Arc<dyn LinkResolver>>,
    options: AggregatorOptions,
}

impl ContextAggregator {
    pub fn new(transport: Arc<dyn TransportClient>, options: AggregatorOptions) -> Self {
        Self {
            transport,
            resolver: None,
            options,
        }
    }

    /// Attach a link resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn LinkResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the context snapshot for one invocation.
    pub async fn build_context(&self, request: &InvocationRequest) -> Result<ContextSnapshot, Error> {
        let raw = self
            .transport
            .fetch_history(&request.channel, self.options.history_limit)
            .await?;

        let history = self.shape_history(raw);

        let reply_chain = if request.kind == InvocationKind::DirectReply {
            match &request.reply_seed {
                Some(seed) => Some(self.gather_reply_chain(request, seed).await),
                None => None,
            }
        } else {
            None
        };

        let in_thread = match self.transport.is_thread(&request.channel).await {
            Ok(flag) => flag,
            Err(e) => {
                debug!(channel = %request.channel, error = %e, "Thread lookup failed, assuming not a thread");
                false
            }
        };

        let link_summaries = self.resolve_links(&history).await;

        Ok(ContextSnapshot {
            history,
            reply_chain,
            in_thread,
            link_summaries,
        })
    }

    /// Filter, budget, and reorder the raw most-recent-first fetch.
    fn shape_history(&self, raw: Vec<ChannelMessage>) -> Vec<ChannelMessage> {
        let bot_lines: Vec<String> = raw
            .iter()
            .filter(|m| m.from_bot)
            .map(|m| m.content.to_lowercase())
            .collect();

        let overused = |content: &str| -> bool {
            // Short lines are never counted; they match everywhere.
            if content.len() < 5 {
                return false;
            }
            let needle = format!("{}\n", content.to_lowercase());
            let count = bot_lines.iter().filter(|line| line.contains(&needle)).count();
            count >= self.options.reuse_limit
        };

        let mut kept: Vec<ChannelMessage> = Vec::new();
        let mut budget = 0usize;
        for message in raw {
            if message.from_bot {
                continue;
            }
            if message.content.starts_with(&self.options.command_prefix) {
                continue;
            }
            if overused(&message.content) {
                debug!(message = %message.id, "Dropping overused line from history");
                continue;
            }

            let mut message = message;
            message.content = truncate(&message.content, self.options.message_char_limit);

            // Newest-first walk: once the budget is spent, everything older
            // is dropped.
            budget += message.author.len() + message.content.len() + 2;
            if budget > self.options.history_char_budget {
                break;
            }
            kept.push(message);
        }

        kept.reverse(); // present oldest-first
        kept
    }

    /// Walk the reply chain upward from `seed`, newest-first, stopping at
    /// the depth cap or at an unresolvable reference. Returned oldest-first.
    async fn gather_reply_chain(
        &self,
        request: &InvocationRequest,
        seed: &MessageId,
    ) -> Vec<ChannelMessage> {
        let mut chain: Vec<ChannelMessage> = Vec::new();
        let mut cursor = Some(seed.clone());

        while let Some(id) = cursor {
            if chain.len() >= self.options.reply_depth {
                debug!(depth = chain.len(), "Reply chain depth cap reached, dropping older entries");
                break;
            }

            match self.transport.fetch_message(&request.channel, &id).await {
                Ok(Some(message)) => {
                    cursor = message.reply_to.clone();
                    let mut message = message;
                    message.content = truncate(&message.content, self.options.message_char_limit);
                    chain.push(message);
                }
                Ok(None) => {
                    debug!(message = %id, "Referenced message no longer exists, skipping");
                    break;
                }
                Err(e) => {
                    warn!(message = %id, error = %e, "Reply-chain fetch failed, skipping rest of chain");
                    break;
                }
            }
        }

        chain.reverse(); // oldest-first
        chain
    }

    /// Resolve recognized links in the shaped history, failures omitted.
    async fn resolve_links(&self, history: &[ChannelMessage]) -> Vec<String> {
        let Some(resolver) = &self.resolver else {
            return Vec::new();
        };

        let mut summaries = Vec::new();
        'outer: for message in history {
            for url in extract_urls(&message.content) {
                if summaries.len() >= self.options.max_links {
                    break 'outer;
                }
                if !resolver.recognizes(url) {
                    continue;
                }
                match tokio::time::timeout(self.options.link_timeout, resolver.resolve(url)).await {
                    Ok(Ok(summary)) => summaries.push(summary),
                    Ok(Err(e)) => debug!(url, error = %e, "Link resolution failed, omitting"),
                    Err(_) => debug!(url, "Link resolution timed out, omitting"),
                }
            }
        }
        summaries
    }
}

fn truncate(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }
    let mut out: String = content.chars().take(limit).collect();
    out.push('…');
    out
}
