//! Long-term memory domain types.
//!
//! A `Memory` is a small persisted fact about one user, used to personalize
//! future responses. Memories are owned exclusively by the memory store and
//! mutated only through its operations; they are never shared across users.

use crate::message::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The key under which a user's memories are stored.
///
/// Depending on configuration, memory is scoped per-user-globally or
/// per-(user, persona). Both forms collapse into one opaque key so the store
/// itself stays policy-free.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey(pub String);

impl UserKey {
    /// Key for memory scoped to the user across all personas.
    pub fn global(user: &UserId) -> Self {
        Self(user.0.clone())
    }

    /// Key for memory scoped to a (user, persona) pair.
    pub fn per_persona(user: &UserId, persona: &str) -> Self {
        Self(format!("{}::{}", user.0, persona))
    }
}

impl std::fmt::Display for UserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single remembered fact about one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// The fact itself
    pub content: String,

    /// A short note about the context in which the fact was learned
    pub context_note: String,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// When this memory was last referenced (drives LRU eviction)
    pub last_referenced: DateTime<Utc>,

    /// How many times this memory has been re-referenced since creation
    #[serde(default)]
    pub reference_count: u32,

    /// Optional embedding vector for paraphrase-level deduplication
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,

    /// Other users mentioned by this fact, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub linked_users: Vec<UserId>,
}

impl Memory {
    /// Create a fresh memory with zero references, timestamped `now`.
    pub fn new(content: impl Into<String>, context_note: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            content: content.into(),
            context_note: context_note.into(),
            created_at: now,
            last_referenced: now,
            reference_count: 0,
            embedding: None,
            linked_users: Vec::new(),
        }
    }

    /// Refresh recency and bump the reference count.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_referenced = now;
        self.reference_count += 1;
    }
}

/// A pending mutation derived from model output.
///
/// Transient: exists only between LLM-result parsing and application to the
/// memory store. Indices are always model-derived and may be stale, which is
/// why out-of-range application is a logged no-op rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MemoryOperation {
    /// Save a new fact (or refresh a duplicate).
    Save { content: String, context: String },

    /// Replace content/context at an existing index.
    Update {
        index: usize,
        content: String,
        context: String,
    },

    /// Remove the entry at an index.
    Forget { index: usize },
}
