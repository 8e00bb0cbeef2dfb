//! The bounded per-user memory store.
//!
//! Each user key owns an ordered list of at most `cap` memories. Mutations go
//! through this store only, under a per-key lock, so concurrent save/update/
//! forget calls for the same user can never interleave into an inconsistent
//! list. Across different users there is no ordering guarantee and none is
//! required.
//!
//! Eviction is strict LRU by `last_referenced`, enforced only at insertion
//! time. There is no background staleness sweep.

use crate::similarity::{cosine_similarity, text_similarity};
use chrono::Utc;
use skylark_core::backend::EmbeddingProvider;
use skylark_core::memory::{Memory, UserKey};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Tunables for the store. Defaults match production settings.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Maximum memories per user key.
    pub cap: usize,

    /// Bigram-ratio threshold above which a save is treated as a duplicate.
    pub text_dedup_threshold: f64,

    /// Cosine threshold above which embeddings mark a paraphrased duplicate.
    pub embedding_dedup_threshold: f32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            cap: 20,
            text_dedup_threshold: 0.90,
            embedding_dedup_threshold: 0.93,
        }
    }
}

/// What a `save` call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// A new memory was appended (possibly after an eviction).
    Inserted,
    /// An existing memory matched and was refreshed instead.
    Refreshed { index: usize },
}

type UserSlot = Arc<Mutex<Vec<Memory>>>;

/// The per-user memory store.
///
/// Construct with [`MemoryStore::in_memory`] for ephemeral state or
/// [`MemoryStore::on_disk`] for the persistent variant, which loads each
/// user's record on first access and flushes dirty users periodically.
pub struct MemoryStore {
    options: StoreOptions,
    users: RwLock<HashMap<UserKey, UserSlot>>,
    dirty: Mutex<HashSet<UserKey>>,
    root: Option<PathBuf>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl MemoryStore {
    /// Create an ephemeral store with no persistence.
    pub fn in_memory(options: StoreOptions) -> Self {
        Self {
            options,
            users: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            root: None,
            embedder: None,
        }
    }

    /// Create a disk-backed store rooted at `root` (one JSON record per
    /// user key, loaded on first access).
    pub fn on_disk(root: PathBuf, options: StoreOptions) -> Self {
        Self {
            options,
            users: RwLock::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            root: Some(root),
            embedder: None,
        }
    }

    /// Attach an embedding provider for paraphrase-level deduplication.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// The configured per-user cap.
    pub fn cap(&self) -> usize {
        self.options.cap
    }

    // ── Operations ────────────────────────────────────────────────────────

    /// Return a defensive copy of the user's memories, never the live list.
    pub async fn get(&self, key: &UserKey) -> Vec<Memory> {
        let slot = self.slot(key).await;
        slot.lock().await.clone()
    }

    /// Save a fact, deduplicating against existing entries.
    ///
    /// Dedup ladder: exact case-insensitive match, then the bigram-ratio
    /// pre-filter, then (when an embedder is attached) cosine similarity
    /// against entries that carry embeddings. Any hit refreshes the existing
    /// entry instead of inserting. At the cap, the entry with the oldest
    /// `last_referenced` is evicted first.
    pub async fn save(
        &self,
        key: &UserKey,
        content: &str,
        context_note: &str,
    ) -> SaveOutcome {
        // Embed outside the lock; the per-key lock must not be held across
        // the backend call.
        let embedding = match &self.embedder {
            Some(embedder) => match embedder.embed(content).await {
                Ok(vector) => Some(vector),
                Err(e) => {
                    debug!(error = %e, "Embedding failed, falling back to textual dedup");
                    None
                }
            },
            None => None,
        };

        let slot = self.slot(key).await;
        let mut memories = slot.lock().await;
        let now = Utc::now();

        if let Some(index) = self.find_duplicate(&memories, content, embedding.as_deref()) {
            memories[index].touch(now);
            debug!(user = %key, index, "Duplicate save refreshed existing memory");
            drop(memories);
            self.mark_dirty(key).await;
            return SaveOutcome::Refreshed { index };
        }

        if memories.len() >= self.options.cap {
            let evict = Self::lru_index(&memories);
            let evicted = memories.remove(evict);
            info!(
                user = %key,
                content = %evicted.content,
                last_referenced = %evicted.last_referenced,
                "Evicted least-recently-referenced memory at cap"
            );
        }

        let mut memory = Memory::new(content, context_note, now);
        memory.embedding = embedding;
        memories.push(memory);
        drop(memories);
        self.mark_dirty(key).await;
        SaveOutcome::Inserted
    }

    /// Replace content and context note at `index`, refreshing recency.
    ///
    /// Out-of-range indices are a logged no-op: indices come from model
    /// output and may be stale.
    pub async fn update(&self, key: &UserKey, index: usize, content: &str, context_note: &str) {
        let slot = self.slot(key).await;
        let mut memories = slot.lock().await;
        let Some(memory) = memories.get_mut(index) else {
            warn!(user = %key, index, count = memories.len(), "update index out of range, ignoring");
            return;
        };
        memory.content = content.to_string();
        memory.context_note = context_note.to_string();
        memory.last_referenced = Utc::now();
        memory.embedding = None;
        drop(memories);
        self.mark_dirty(key).await;
    }

    /// Remove the entry at `index`. Out-of-range is a logged no-op.
    pub async fn forget(&self, key: &UserKey, index: usize) {
        let slot = self.slot(key).await;
        let mut memories = slot.lock().await;
        if index >= memories.len() {
            warn!(user = %key, index, count = memories.len(), "forget index out of range, ignoring");
            return;
        }
        let removed = memories.remove(index);
        debug!(user = %key, content = %removed.content, "Forgot memory");
        drop(memories);
        self.mark_dirty(key).await;
    }

    /// Unconditionally clear all memories and persisted state for the user.
    pub async fn forget_all(&self, key: &UserKey) {
        let slot = self.slot(key).await;
        slot.lock().await.clear();
        self.dirty.lock().await.remove(key);

        if let Some(path) = self.record_path(key) {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(user = %key, error = %e, "Failed to remove persisted memory record");
                }
            }
        }
        info!(user = %key, "Cleared all memories");
    }

    /// Deliberately a no-op.
    ///
    /// Bulk-touching defeats LRU ordering by collapsing every timestamp to
    /// the same instant; only individual-memory touches (via save/update)
    /// may refresh recency.
    pub async fn touch_all(&self, key: &UserKey) {
        debug!(user = %key, "touch_all requested; ignored to preserve LRU ordering");
    }

    /// Atomically swap the user's entire memory list.
    ///
    /// Used by consolidation: readers observe either the old list or the new
    /// one, never an interleaving.
    pub async fn replace_all(&self, key: &UserKey, memories: Vec<Memory>) {
        let slot = self.slot(key).await;
        *slot.lock().await = memories;
        self.mark_dirty(key).await;
    }

    // ── Dedup / eviction internals ────────────────────────────────────────

    fn find_duplicate(
        &self,
        memories: &[Memory],
        content: &str,
        embedding: Option<&[f32]>,
    ) -> Option<usize> {
        let content_lower = content.to_lowercase();

        // Exact case-insensitive match first: cheapest and unambiguous.
        if let Some(index) = memories
            .iter()
            .position(|m| m.content.to_lowercase() == content_lower)
        {
            return Some(index);
        }

        // Fast textual pre-filter.
        if let Some(index) = memories
            .iter()
            .position(|m| text_similarity(&m.content, content) >= self.options.text_dedup_threshold)
        {
            return Some(index);
        }

        // Embedding check catches paraphrases the bigram ratio misses.
        // Entries without an embedding were already covered above.
        if let Some(new_embedding) = embedding {
            if let Some(index) = memories.iter().position(|m| {
                m.embedding.as_ref().is_some_and(|existing| {
                    cosine_similarity(existing, new_embedding)
                        >= self.options.embedding_dedup_threshold
                })
            }) {
                return Some(index);
            }
        }

        None
    }

    /// Index of the memory with the strictly smallest `last_referenced`.
    /// Ties go to the first-encountered entry.
    fn lru_index(memories: &[Memory]) -> usize {
        let mut oldest = 0;
        for (i, memory) in memories.iter().enumerate().skip(1) {
            if memory.last_referenced < memories[oldest].last_referenced {
                oldest = i;
            }
        }
        oldest
    }

    // ── Slots and persistence ─────────────────────────────────────────────

    /// Fetch or create the per-key slot, loading from disk on first access.
    async fn slot(&self, key: &UserKey) -> UserSlot {
        if let Some(slot) = self.users.read().await.get(key) {
            return Arc::clone(slot);
        }

        let mut users = self.users.write().await;
        // Re-check: another task may have created the slot between locks.
        if let Some(slot) = users.get(key) {
            return Arc::clone(slot);
        }

        let initial = self.load_record(key);
        let slot: UserSlot = Arc::new(Mutex::new(initial));
        users.insert(key.clone(), Arc::clone(&slot));
        slot
    }

    fn load_record(&self, key: &UserKey) -> Vec<Memory> {
        let Some(path) = self.record_path(key) else {
            return Vec::new();
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Vec::new(), // No record yet — start empty
        };
        match serde_json::from_str::<Vec<Memory>>(&content) {
            Ok(memories) => {
                debug!(user = %key, count = memories.len(), "Loaded memory record from disk");
                memories
            }
            Err(e) => {
                warn!(user = %key, error = %e, "Corrupted memory record, starting empty");
                Vec::new()
            }
        }
    }

    fn record_path(&self, key: &UserKey) -> Option<PathBuf> {
        let root = self.root.as_ref()?;
        let safe: String = key
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        Some(root.join(format!("{safe}.json")))
    }

    async fn mark_dirty(&self, key: &UserKey) {
        if self.root.is_some() {
            self.dirty.lock().await.insert(key.clone());
        }
    }

    /// How many users currently await a flush. Exposed for tests and metrics.
    pub async fn dirty_count(&self) -> usize {
        self.dirty.lock().await.len()
    }

    /// Write all dirty users' full record sets to disk.
    ///
    /// Each record is written to a temporary file then atomically renamed, so
    /// a crash mid-write never corrupts the durable record. On failure the
    /// dirty flag is restored for retry on the next interval. Returns how
    /// many users were flushed successfully.
    pub async fn flush_dirty(&self) -> usize {
        let keys: Vec<UserKey> = {
            let mut dirty = self.dirty.lock().await;
            dirty.drain().collect()
        };
        if keys.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        for key in keys {
            // Snapshot under the per-key lock so the flush and in-request
            // mutations are serialized relative to each other.
            let snapshot = {
                let slot = self.slot(&key).await;
                let memories = slot.lock().await;
                memories.clone()
            };

            match self.write_record(&key, &snapshot) {
                Ok(()) => {
                    debug!(user = %key, count = snapshot.len(), "Flushed memory record");
                    flushed += 1;
                }
                Err(e) => {
                    warn!(user = %key, error = %e, "Flush failed, re-marking dirty");
                    self.dirty.lock().await.insert(key);
                }
            }
        }
        flushed
    }

    fn write_record(&self, key: &UserKey, memories: &[Memory]) -> std::io::Result<()> {
        let Some(path) = self.record_path(key) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(memories)
            .map_err(|e| std::io::Error::other(e.to_string()))?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Spawn the periodic flush task. Runs until the store is dropped and
    /// the handle is aborted by the host.
    pub fn spawn_flusher(self: &Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                store.flush_dirty().await;
            }
        })
    }
}
