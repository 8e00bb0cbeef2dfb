//! # Skylark Core
//!
//! Domain types, traits, and error definitions for the Skylark conversational
//! assistant. This crate has **zero framework dependencies** — it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (chat transport, LLM backend, link resolver,
//! embedding provider) is defined as a trait here. Implementations live in
//! their respective crates or in the hosting application. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod error;
pub mod invocation;
pub mod memory;
pub mod message;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use backend::{BackendReply, BackendRequest, ChatBackend, EmbeddingProvider, ToolSchema, ToolUse};
pub use error::{BackendError, Error, Result, TransportError};
pub use invocation::{DeliveryMode, InvocationKind, InvocationRequest, InvocationResult};
pub use memory::{Memory, MemoryOperation, UserKey};
pub use message::{ChannelId, ChannelMessage, ContextSnapshot, MessageId, UserId};
pub use transport::TransportClient;
