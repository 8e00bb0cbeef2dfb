//! Prompt construction for the primary chat call.
//!
//! System instructions embed the persona, a topic-presence flag, thread and
//! reply-chain awareness, and a delimited memory block capped at a fixed
//! entry count so token usage stays bounded.

use skylark_core::backend::ToolSchema;
use skylark_core::invocation::{InvocationKind, InvocationRequest};
use skylark_core::memory::Memory;
use skylark_core::message::ContextSnapshot;

const MEMORY_BLOCK_OPEN: &str = "--- things you remember about this user ---";
const MEMORY_BLOCK_CLOSE: &str = "--- end of memories ---";

/// The structured result schema requested from the model: an explicit
/// target-message id (or null) plus text, so delivery mode is a first-class
/// machine-checkable output instead of being inferred from prose.
pub fn send_chat_message_schema() -> ToolSchema {
    ToolSchema {
        name: "send_chat_message".into(),
        description: "Send your reply to the channel. Set reply_to_message_id to the id of \
                      the message you are answering, or null to speak to the whole channel."
            .into(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The message text to send"
                },
                "reply_to_message_id": {
                    "type": ["string", "null"],
                    "description": "Id of the message to reply to, or null for a channel message"
                }
            },
            "required": ["text", "reply_to_message_id"]
        }),
    }
}

/// Build the system instructions for one invocation.
pub fn system_instructions(
    request: &InvocationRequest,
    snapshot: &ContextSnapshot,
    memories: &[Memory],
    inject_limit: usize,
) -> String {
    let mut instructions = format!(
        "You are {persona}, a participant in a group chat. Stay in character.\n",
        persona = request.persona
    );

    match &request.topic {
        Some(topic) => {
            instructions.push_str(&format!(
                "The user asked you to address this topic: {topic}\n"
            ));
        }
        None => {
            instructions.push_str("No specific topic was given; respond to the conversation.\n");
        }
    }

    if snapshot.in_thread {
        instructions.push_str("This conversation is inside a thread; keep your reply on-topic.\n");
    }
    if request.kind == InvocationKind::DirectReply {
        instructions.push_str(
            "The user replied directly to one of your messages; the reply chain is included \
             below the channel history.\n",
        );
    }

    if !memories.is_empty() {
        instructions.push('\n');
        instructions.push_str(MEMORY_BLOCK_OPEN);
        instructions.push('\n');
        for memory in memories.iter().take(inject_limit) {
            instructions.push_str(&format!(
                "- {} ({})\n",
                memory.content, memory.context_note
            ));
        }
        instructions.push_str(MEMORY_BLOCK_CLOSE);
        instructions.push('\n');
    }

    instructions.push_str(
        "\nUse the send_chat_message tool to answer. Only reply to a message id that appears \
         in the history you were shown.",
    );
    instructions
}

/// Render the user-turn input: history, reply chain, and link summaries.
pub fn user_input(snapshot: &ContextSnapshot) -> String {
    let mut input = String::from("Recent channel history (oldest first):\n");
    if snapshot.history.is_empty() {
        input.push_str("(no recent messages)\n");
    }
    for message in &snapshot.history {
        input.push_str(&format!("[{}] {}\n", message.id, message.render()));
    }

    if let Some(chain) = &snapshot.reply_chain {
        input.push_str("\nReply chain you are being asked about (oldest first):\n");
        for message in chain {
            input.push_str(&format!("[{}] {}\n", message.id, message.render()));
        }
    }

    if !snapshot.link_summaries.is_empty() {
        input.push_str("\nLinked articles mentioned above:\n");
        for summary in &snapshot.link_summaries {
            input.push_str(&format!("- {summary}\n"));
        }
    }

    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use skylark_core::message::{ChannelId, ChannelMessage, MessageId, UserId};

    fn request(kind: InvocationKind, topic: Option<&str>) -> InvocationRequest {
        InvocationRequest {
            persona: "captain".into(),
            topic: topic.map(String::from),
            user: UserId("u1".into()),
            channel: ChannelId("general".into()),
            timestamp: Utc::now(),
            kind,
            reply_seed: None,
            trigger: None,
        }
    }

    fn msg(id: &str, author: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            id: MessageId(id.into()),
            author: author.into(),
            content: content.into(),
            timestamp: Utc::now(),
            from_bot: false,
            image_urls: vec![],
            reply_to: None,
        }
    }

    #[test]
    fn instructions_embed_persona_and_topic() {
        let snapshot = ContextSnapshot::default();
        let text = system_instructions(
            &request(InvocationKind::Command, Some("sea shanties")),
            &snapshot,
            &[],
            10,
        );
        assert!(text.contains("You are captain"));
        assert!(text.contains("sea shanties"));
        assert!(!text.contains(MEMORY_BLOCK_OPEN));
    }

    #[test]
    fn memory_block_is_capped() {
        let now = Utc::now();
        let memories: Vec<Memory> = (0..15)
            .map(|i| Memory::new(format!("fact {i}"), "ctx", now))
            .collect();
        let text = system_instructions(
            &request(InvocationKind::Command, None),
            &ContextSnapshot::default(),
            &memories,
            10,
        );
        assert!(text.contains("fact 9"));
        assert!(!text.contains("fact 10"));
        assert!(text.contains(MEMORY_BLOCK_OPEN));
        assert!(text.contains(MEMORY_BLOCK_CLOSE));
    }

    #[test]
    fn thread_and_reply_awareness_flags() {
        let snapshot = ContextSnapshot {
            in_thread: true,
            ..ContextSnapshot::default()
        };
        let text = system_instructions(
            &request(InvocationKind::DirectReply, None),
            &snapshot,
            &[],
            10,
        );
        assert!(text.contains("inside a thread"));
        assert!(text.contains("replied directly"));
    }

    #[test]
    fn input_renders_ids_history_and_chain() {
        let snapshot = ContextSnapshot {
            history: vec![msg("1", "alice", "hello")],
            reply_chain: Some(vec![msg("9", "bob", "earlier point")]),
            in_thread: false,
            link_summaries: vec!["An Article".into()],
        };
        let input = user_input(&snapshot);
        assert!(input.contains("[1] alice: hello"));
        assert!(input.contains("[9] bob: earlier point"));
        assert!(input.contains("- An Article"));
    }

    #[test]
    fn empty_history_is_stated() {
        let input = user_input(&ContextSnapshot::default());
        assert!(input.contains("(no recent messages)"));
    }
}
