//! Error types for the Skylark domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Skylark operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- LLM backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The enclosing invocation was cancelled. Never converted into a
    /// user-visible message; propagates uncaught.
    #[error("Request cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    #[error("Message not found: {message_id} in channel {channel_id}")]
    MessageNotFound {
        channel_id: String,
        message_id: String,
    },

    #[error("History fetch failed for {channel_id}: {reason}")]
    HistoryFetchFailed { channel_id: String, reason: String },

    #[error("Transport connection lost: {0}")]
    ConnectionLost(String),
}

impl BackendError {
    /// Whether this error is a cancellation, which must propagate uncaught
    /// rather than be converted into an apology message.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BackendError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_error_displays_correctly() {
        let err = Error::Backend(BackendError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn transport_not_found_displays_both_ids() {
        let err = Error::Transport(TransportError::MessageNotFound {
            channel_id: "general".into(),
            message_id: "12345".into(),
        });
        assert!(err.to_string().contains("general"));
        assert!(err.to_string().contains("12345"));
    }

    #[test]
    fn cancellation_is_detected() {
        assert!(BackendError::Cancelled.is_cancellation());
        assert!(!BackendError::Timeout("slow".into()).is_cancellation());
    }
}
