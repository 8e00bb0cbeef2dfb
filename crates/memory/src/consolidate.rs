//! Memory consolidation — compressing a user's memory set into fewer,
//! merged entries via an LLM call.
//!
//! Consolidation is triggered externally when a user nears the cap. The
//! model sees every memory with its index, context note, and reference
//! count, and answers with a smaller JSON array of merged facts. A parse
//! failure leaves the existing memory set untouched — never partially
//! applied.

use crate::store::MemoryStore;
use chrono::Utc;
use skylark_core::backend::{BackendRequest, ChatBackend};
use skylark_core::error::BackendError;
use skylark_core::memory::{Memory, UserKey};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of entries to consolidate down to: `cap × fraction`, minimum 1.
pub fn target_count(cap: usize, fraction: f64) -> usize {
    ((cap as f64 * fraction).ceil() as usize).max(1)
}

/// Render the consolidation prompt: every memory indexed from 0 with its
/// content, context, and reference count.
pub fn consolidation_prompt(memories: &[Memory], target: usize) -> String {
    let mut prompt = String::from(
        "These are the facts currently remembered about a user. Merge redundant \
         facts, preserve facts with high reference counts, and drop low-value ones.\n\n",
    );
    for (i, memory) in memories.iter().enumerate() {
        prompt.push_str(&format!(
            "{i}. {} (context: {}; referenced {} times)\n",
            memory.content, memory.context_note, memory.reference_count
        ));
    }
    prompt.push_str(&format!(
        "\nAnswer with a JSON array of at most {target} objects, each with \
         \"content\" and \"context\" string fields. Answer with the JSON array only.",
    ));
    prompt
}

/// Parse the model's answer into `(content, context)` pairs.
///
/// Tolerates surrounding prose and markdown fences by extracting the first
/// bracketed array. Returns `None` for anything that does not parse into a
/// non-empty array of objects with string `content`.
pub fn parse_consolidated(text: &str) -> Option<Vec<(String, String)>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let items = value.as_array()?;

    let mut pairs = Vec::with_capacity(items.len());
    for item in items {
        let content = item.get("content")?.as_str()?.trim();
        if content.is_empty() {
            return None;
        }
        let context = item
            .get("context")
            .and_then(|c| c.as_str())
            .unwrap_or_default();
        pairs.push((content.to_string(), context.to_string()));
    }

    if pairs.is_empty() { None } else { Some(pairs) }
}

/// Drives consolidation runs against a store.
pub struct Consolidator {
    backend: Arc<dyn ChatBackend>,
    model: String,
    fraction: f64,
    max_tokens: Option<u32>,
}

impl Consolidator {
    pub fn new(backend: Arc<dyn ChatBackend>, model: impl Into<String>, fraction: f64) -> Self {
        Self {
            backend,
            model: model.into(),
            fraction,
            max_tokens: Some(1024),
        }
    }

    /// Consolidate one user's memories if they exceed the target count.
    ///
    /// Returns `Ok(true)` when the memory set was replaced. Unparsable or
    /// empty model output leaves memory untouched and returns `Ok(false)`.
    pub async fn run(&self, store: &MemoryStore, key: &UserKey) -> Result<bool, BackendError> {
        let snapshot = store.get(key).await;
        let target = target_count(store.cap(), self.fraction);
        if snapshot.len() <= target {
            debug!(user = %key, count = snapshot.len(), target, "Consolidation not needed");
            return Ok(false);
        }

        let prompt = consolidation_prompt(&snapshot, target);
        let reply = self
            .backend
            .send(BackendRequest {
                model: self.model.clone(),
                instructions: "You compress a user memory list for a chat assistant.".into(),
                input: prompt,
                tool: None,
                require_tool: false,
                max_tokens: self.max_tokens,
            })
            .await?;

        let Some(pairs) = reply.text.as_deref().and_then(parse_consolidated) else {
            warn!(user = %key, "Consolidation output unparsable, leaving memory untouched");
            return Ok(false);
        };

        let now = Utc::now();
        let consolidated: Vec<Memory> = pairs
            .into_iter()
            .take(target)
            .map(|(content, context)| Memory::new(content, context, now))
            .collect();

        info!(
            user = %key,
            before = snapshot.len(),
            after = consolidated.len(),
            "Consolidated memories"
        );
        store.replace_all(key, consolidated).await;
        Ok(true)
    }
}
