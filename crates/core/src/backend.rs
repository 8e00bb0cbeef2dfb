//! ChatBackend trait — the abstraction over the LLM backend.
//!
//! The backend knows how to send one request and return either a structured
//! tool call or free text. Transport details (HTTP, auth, retries) live in
//! the implementing crate; the orchestrator only sees this trait.

use crate::error::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A tool definition sent to the LLM so it knows the shape of the structured
/// result we expect back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One request to the backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    /// The model to use (e.g., "gpt-4o", "gpt-4o-mini")
    pub model: String,

    /// System instructions (persona, context, memory block)
    pub instructions: String,

    /// The user-turn input
    pub input: String,

    /// Tool the model may (or must) call
    pub tool: Option<ToolSchema>,

    /// When true, the backend is asked to force exactly the given tool.
    /// The model can still misbehave; callers must treat the reply as
    /// untrusted either way.
    pub require_tool: bool,

    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// A tool call returned by the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUse {
    /// Name of the tool the model invoked
    pub name: String,

    /// Arguments as a raw JSON string — may be malformed
    pub arguments: String,
}

/// What came back from the backend: possibly a tool call, possibly free
/// text, possibly neither. Classification into a delivery decision happens
/// in the orchestrator, never here.
#[derive(Debug, Clone, Default)]
pub struct BackendReply {
    /// Tool calls, in the order the model emitted them
    pub tool_uses: Vec<ToolUse>,

    /// Free text, if the model produced any
    pub text: Option<String>,
}

/// The LLM backend seam.
///
/// Implementations handle HTTP, auth, and transport-level retries. Skylark
/// itself never retries at this layer.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable backend name (e.g., "openai", "mock").
    fn name(&self) -> &str;

    /// Send one request and return the raw reply.
    async fn send(&self, request: BackendRequest) -> std::result::Result<BackendReply, BackendError>;
}

/// Optional embedding seam used for paraphrase-level memory deduplication.
///
/// Memory entries without an embedding fall back to textual similarity only,
/// so an implementation is never required.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for the given text.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, BackendError>;
}
