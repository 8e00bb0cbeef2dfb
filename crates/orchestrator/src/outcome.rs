//! Classification of raw backend replies into a delivery decision.
//!
//! The model is asked for a `send_chat_message` tool call, but its output is
//! untrusted: the call may be missing, carry malformed arguments, or name a
//! message id that does not exist. Classification is pure and total; the
//! orchestrator decides what each shape falls back to.

use serde::Deserialize;
use skylark_core::backend::BackendReply;
use skylark_core::message::MessageId;
use tracing::debug;

pub const SEND_TOOL_NAME: &str = "send_chat_message";

/// What the backend reply amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyOutcome {
    /// A well-formed tool call: text plus an optional target message id.
    Structured {
        text: String,
        target: Option<MessageId>,
    },
    /// The expected tool call was present but its arguments were unusable.
    /// Any free text the model also produced is carried for fallback.
    Malformed { fallback_text: Option<String> },
    /// No tool call at all; free text only, or nothing.
    Absent { fallback_text: Option<String> },
}

#[derive(Deserialize)]
struct SendArgs {
    text: String,
    #[serde(default)]
    reply_to_message_id: Option<String>,
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
}

/// Classify one backend reply.
///
/// Only the first `send_chat_message` call counts; the model occasionally
/// emits duplicates and honoring more than one would mean double-posting.
pub fn classify_reply(reply: &BackendReply) -> ReplyOutcome {
    let call = reply.tool_uses.iter().find(|t| t.name == SEND_TOOL_NAME);

    let Some(call) = call else {
        return ReplyOutcome::Absent {
            fallback_text: non_empty(reply.text.as_deref()),
        };
    };

    match serde_json::from_str::<SendArgs>(&call.arguments) {
        Ok(args) if !args.text.trim().is_empty() => ReplyOutcome::Structured {
            text: args.text,
            target: args
                .reply_to_message_id
                .filter(|id| !id.is_empty())
                .map(MessageId),
        },
        Ok(_) => {
            debug!("Tool call carried empty text, treating as malformed");
            ReplyOutcome::Malformed {
                fallback_text: non_empty(reply.text.as_deref()),
            }
        }
        Err(e) => {
            debug!(error = %e, "Tool call arguments failed to parse");
            ReplyOutcome::Malformed {
                fallback_text: non_empty(reply.text.as_deref()),
            }
        }
    }
}
