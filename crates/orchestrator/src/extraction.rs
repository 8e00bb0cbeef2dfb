//! The decoupled memory-extraction pass.
//!
//! After a response has been delivered, a cheaper model looks at the
//! completed exchange (channel history, the invoking user's request, and the
//! reply that was just sent) alongside the user's current memories, and
//! proposes a list of memory operations. The pass is fire-and-forget: every
//! failure is logged and swallowed, and a bad run leaves memory exactly as
//! it was. Indices in model output may be stale, which the store already
//! tolerates.

use skylark_core::backend::{BackendRequest, ChatBackend};
use skylark_core::memory::{MemoryOperation, UserKey};
use skylark_core::message::ChannelMessage;
use skylark_memory::{Consolidator, MemoryStore};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The completed exchange handed to the extraction pass.
///
/// Command-prefixed trigger messages never survive history shaping, so the
/// topic and the delivered response are carried explicitly and rendered as
/// the final turns of the conversation.
pub struct ExchangeRecord<'a> {
    /// The invoking user, as rendered in history lines.
    pub user_name: &'a str,

    /// The persona the response was delivered as.
    pub persona: &'a str,

    /// Shaped channel history, oldest-first.
    pub history: &'a [ChannelMessage],

    /// Topic text the user supplied with the command, if any.
    pub topic: Option<&'a str>,

    /// The response text that was just delivered.
    pub response: &'a str,
}

/// Parse the model's answer into memory operations.
///
/// Tolerates surrounding prose and markdown fences by extracting the first
/// bracketed array. An empty array is a valid "nothing worth remembering".
pub fn parse_operations(text: &str) -> Option<Vec<MemoryOperation>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Drop save operations whose content duplicates an earlier save in the same
/// batch (case-insensitive). The store dedups against stored entries; this
/// catches the model proposing the same fact twice in one answer.
pub fn dedupe_saves(operations: Vec<MemoryOperation>) -> Vec<MemoryOperation> {
    let mut seen = HashSet::new();
    operations
        .into_iter()
        .filter(|op| match op {
            MemoryOperation::Save { content, .. } => seen.insert(content.to_lowercase()),
            _ => true,
        })
        .collect()
}

/// Runs the extraction pass for one invocation.
pub struct MemoryExtractor {
    backend: Arc<dyn ChatBackend>,
    model: String,
    max_tokens: Option<u32>,
}

impl MemoryExtractor {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: Some(1024),
        }
    }

    fn prompt(&self, exchange: &ExchangeRecord<'_>, memories_listing: &str) -> String {
        let mut prompt = format!(
            "Facts currently remembered about {user} (indexed):\n{memories_listing}\n\
             The conversation that just finished:\n",
            user = exchange.user_name,
        );
        for message in exchange.history {
            prompt.push_str(&message.render());
            prompt.push('\n');
        }
        if let Some(topic) = exchange.topic {
            prompt.push_str(&format!("{}: {topic}\n", exchange.user_name));
        }
        prompt.push_str(&format!("{}: {}\n", exchange.persona, exchange.response));
        prompt.push_str(&format!(
            "\nPropose memory operations about {user} only. Answer with a JSON array \
             (possibly empty) of objects shaped like \
             {{\"op\":\"save\",\"content\":\"...\",\"context\":\"...\"}}, \
             {{\"op\":\"update\",\"index\":N,\"content\":\"...\",\"context\":\"...\"}} or \
             {{\"op\":\"forget\",\"index\":N}}. Save only durable facts, not small talk. \
             Answer with the JSON array only.",
            user = exchange.user_name,
        ));
        prompt
    }

    /// Run extraction and apply the resulting operations.
    ///
    /// Returns the number of operations applied; zero on any failure.
    pub async fn run(
        &self,
        store: &MemoryStore,
        key: &UserKey,
        exchange: &ExchangeRecord<'_>,
    ) -> usize {
        if exchange.history.is_empty() && exchange.topic.is_none() {
            debug!(user = %key, "No user-authored content to extract from");
            return 0;
        }

        let existing = store.get(key).await;
        let mut listing = String::new();
        for (i, memory) in existing.iter().enumerate() {
            listing.push_str(&format!("{i}. {} ({})\n", memory.content, memory.context_note));
        }
        if existing.is_empty() {
            listing.push_str("(none yet)\n");
        }

        let reply = match self
            .backend
            .send(BackendRequest {
                model: self.model.clone(),
                instructions:
                    "You maintain a small set of long-term memory notes about chat users.".into(),
                input: self.prompt(exchange, &listing),
                tool: None,
                require_tool: false,
                max_tokens: self.max_tokens,
            })
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                debug!(user = %key, error = %e, "Extraction call failed, skipping");
                return 0;
            }
        };

        let Some(operations) = reply.text.as_deref().and_then(parse_operations) else {
            warn!(user = %key, "Extraction output unparsable, skipping");
            return 0;
        };

        let operations = dedupe_saves(operations);
        let applied = operations.len();
        for operation in operations {
            match operation {
                MemoryOperation::Save { content, context } => {
                    store.save(key, &content, &context).await;
                }
                MemoryOperation::Update {
                    index,
                    content,
                    context,
                } => {
                    store.update(key, index, &content, &context).await;
                }
                MemoryOperation::Forget { index } => {
                    store.forget(key, index).await;
                }
            }
        }

        if applied > 0 {
            info!(user = %key, applied, "Applied extracted memory operations");
        }
        applied
    }

    /// The full post-delivery pass: extract, then consolidate if the user's
    /// memory set has grown to the cap.
    pub async fn run_with_consolidation(
        &self,
        store: &MemoryStore,
        consolidator: &Consolidator,
        key: &UserKey,
        exchange: &ExchangeRecord<'_>,
    ) {
        self.run(store, key, exchange).await;

        if store.get(key).await.len() >= store.cap() {
            match consolidator.run(store, key).await {
                Ok(replaced) => {
                    debug!(user = %key, replaced, "Consolidation pass finished");
                }
                Err(e) => {
                    warn!(user = %key, error = %e, "Consolidation call failed");
                }
            }
        }
    }
}
