//! Per-user long-term memory for Skylark.
//!
//! The store keeps a bounded, LRU-evicted list of facts per user key,
//! deduplicates saves (exact, textual, and embedding-level), and supports
//! LLM-driven consolidation. The disk-backed variant persists one JSON
//! record per user with debounced, atomic flushes.

pub mod consolidate;
pub mod similarity;
pub mod store;

pub use consolidate::{Consolidator, consolidation_prompt, parse_consolidated, target_count};
pub use similarity::{cosine_similarity, text_similarity};
pub use store::{MemoryStore, SaveOutcome, StoreOptions};
