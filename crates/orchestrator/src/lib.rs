//! Invocation orchestration for Skylark.
//!
//! Ties the other crates together: safety gates, context assembly, memory
//! recall and injection, the primary model call, reply classification, and
//! the fire-and-forget memory-extraction pass.

pub mod extraction;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;

pub use extraction::{ExchangeRecord, MemoryExtractor};
pub use orchestrator::{FinalState, InvocationReport, Orchestrator, OrchestratorOptions};
pub use outcome::{ReplyOutcome, classify_reply};
