//! The per-invocation orchestrator.
//!
//! One invocation walks a fixed pipeline: safety gates, context assembly,
//! memory recall, the primary model call, reply classification, and output
//! scrubbing. Exactly one `InvocationResult` comes out of every run except
//! cancellation, which propagates as an error so callers can tear down
//! silently instead of posting a half-built message.
//!
//! The memory-extraction pass is spawned after the result is composed and
//! never blocks or fails the invocation.

use crate::extraction::{ExchangeRecord, MemoryExtractor};
use crate::outcome::{ReplyOutcome, classify_reply};
use crate::prompt;
use skylark_core::backend::{BackendRequest, ChatBackend};
use skylark_core::error::Error;
use skylark_core::invocation::{InvocationRequest, InvocationResult};
use skylark_core::memory::{Memory, UserKey};
use skylark_core::message::{ContextSnapshot, MessageId, UserId};
use skylark_config::AppConfig;
use skylark_context::ContextAggregator;
use skylark_memory::{Consolidator, MemoryStore};
use skylark_safety::SafetyFilter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hard transport-side message length cap.
const PLATFORM_MESSAGE_CAP: usize = 2000;

/// Tunables for the orchestrator. Defaults match production settings.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Model for the primary chat call.
    pub chat_model: String,

    /// Token cap for the primary call.
    pub max_tokens: Option<u32>,

    /// At most this many memories are injected into the system instructions.
    pub memory_inject_limit: usize,

    /// When true, memory is keyed per (user, persona) instead of per user.
    pub scope_per_persona: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4o".into(),
            max_tokens: Some(1024),
            memory_inject_limit: 10,
            scope_per_persona: false,
        }
    }
}

impl OrchestratorOptions {
    /// Derive options from a loaded application config.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            chat_model: config.chat_model.clone(),
            max_tokens: Some(config.max_tokens),
            memory_inject_limit: config.memory.inject_limit,
            scope_per_persona: config.memory.scope_per_persona,
        }
    }
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalState {
    /// The model's response (or a fallback) is ready to deliver.
    Delivered,
    /// The channel or global rate window was full; no model call was made.
    RateLimited,
    /// The invocation arrived inside the quiet window; no model call was made.
    QuietHours,
    /// The backend or transport faulted; the result is an in-character apology.
    Faulted,
}

/// The result of one invocation plus how it was reached.
#[derive(Debug, Clone)]
pub struct InvocationReport {
    pub result: InvocationResult,
    pub state: FinalState,
}

/// Drives one invocation end to end.
pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    store: Arc<MemoryStore>,
    safety: Arc<SafetyFilter>,
    aggregator: Arc<ContextAggregator>,
    extractor: Arc<MemoryExtractor>,
    consolidator: Arc<Consolidator>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<MemoryStore>,
        safety: Arc<SafetyFilter>,
        aggregator: Arc<ContextAggregator>,
        extractor: Arc<MemoryExtractor>,
        consolidator: Arc<Consolidator>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            backend,
            store,
            safety,
            aggregator,
            extractor,
            consolidator,
            options,
        }
    }

    /// Run one invocation.
    ///
    /// Errors only on cancellation; every other failure mode ends in a
    /// deliverable report.
    pub async fn run(&self, request: &InvocationRequest) -> Result<InvocationReport, Error> {
        if self.safety.is_quiet_hour(request.timestamp) {
            info!(channel = %request.channel, "Invocation during quiet hours, declining");
            return Ok(self.terminal(
                FinalState::QuietHours,
                format!("*{} is asleep right now. Try again in the morning.*", request.persona),
            ));
        }

        if self.safety.should_rate_limit(request.timestamp, &request.channel) {
            info!(channel = %request.channel, "Invocation rate limited");
            return Ok(self.terminal(
                FinalState::RateLimited,
                format!(
                    "*{} needs to catch their breath. Give it a little while.*",
                    request.persona
                ),
            ));
        }
        debug!(channel = %request.channel, kind = ?request.kind, "Gates passed");

        let snapshot = match self.aggregator.build_context(request).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(channel = %request.channel, error = %e, "Context assembly failed");
                return Ok(self.faulted(request));
            }
        };
        debug!(
            history = snapshot.history.len(),
            in_thread = snapshot.in_thread,
            "Context built"
        );

        let key = self.user_key(request);
        let memories = self.store.get(&key).await;

        let backend_request = BackendRequest {
            model: self.options.chat_model.clone(),
            instructions: prompt::system_instructions(
                request,
                &snapshot,
                &memories,
                self.options.memory_inject_limit,
            ),
            input: prompt::user_input(&snapshot),
            tool: Some(prompt::send_chat_message_schema()),
            require_tool: true,
            max_tokens: self.options.max_tokens,
        };

        let reply = match self.backend.send(backend_request).await {
            Ok(reply) => reply,
            Err(e) if e.is_cancellation() => {
                debug!(channel = %request.channel, "Invocation cancelled mid-flight");
                return Err(e.into());
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Primary model call failed");
                return Ok(self.faulted(request));
            }
        };
        debug!(tool_uses = reply.tool_uses.len(), "Reply received");

        let result = self.compose(request, &snapshot, classify_reply(&reply));
        info!(
            channel = %request.channel,
            mode = ?result.mode,
            chars = result.text.len(),
            "Response ready"
        );

        self.spawn_extraction(request, snapshot, result.text.clone());

        Ok(InvocationReport {
            result,
            state: FinalState::Delivered,
        })
    }

    // ── Memory escape hatches ─────────────────────────────────────────────

    /// List a user's memories directly, no model call.
    pub async fn list_memories(&self, user: &UserId, persona: &str) -> Vec<Memory> {
        self.store.get(&self.key_for(user, persona)).await
    }

    /// Wipe a user's memories directly, no model call.
    pub async fn forget_user(&self, user: &UserId, persona: &str) {
        self.store.forget_all(&self.key_for(user, persona)).await;
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn user_key(&self, request: &InvocationRequest) -> UserKey {
        self.key_for(&request.user, &request.persona)
    }

    fn key_for(&self, user: &UserId, persona: &str) -> UserKey {
        if self.options.scope_per_persona {
            UserKey::per_persona(user, persona)
        } else {
            UserKey::global(user)
        }
    }

    /// Turn a classified reply into the final delivery decision.
    ///
    /// Fallback order: structured call, then any free text the model
    /// produced, then an in-character placeholder. A structured target id
    /// is honored only if it appears in the snapshot; anything else
    /// downgrades to a broadcast rather than erroring the invocation.
    fn compose(
        &self,
        request: &InvocationRequest,
        snapshot: &ContextSnapshot,
        outcome: ReplyOutcome,
    ) -> InvocationResult {
        let (text, target) = match outcome {
            ReplyOutcome::Structured { text, target } => {
                let target = target.and_then(|id| self.validate_target(snapshot, id));
                (text, target)
            }
            ReplyOutcome::Malformed { fallback_text } | ReplyOutcome::Absent { fallback_text } => {
                match fallback_text {
                    Some(text) => {
                        debug!("Falling back to free-text broadcast");
                        (text, None)
                    }
                    None => {
                        warn!(channel = %request.channel, "Model produced nothing usable");
                        (
                            format!(
                                "*{} stares into the middle distance, lost for words.*",
                                request.persona
                            ),
                            None,
                        )
                    }
                }
            }
        };

        let text = clip_to_platform_limit(self.safety.scrub(&text));
        match target {
            Some(id) => InvocationResult::reply(text, id),
            None => InvocationResult::broadcast(text),
        }
    }

    fn validate_target(&self, snapshot: &ContextSnapshot, id: MessageId) -> Option<MessageId> {
        if snapshot.contains_message(&id) {
            Some(id)
        } else {
            warn!(target = %id, "Model named a message id outside the snapshot, broadcasting");
            None
        }
    }

    fn terminal(&self, state: FinalState, text: String) -> InvocationReport {
        InvocationReport {
            result: InvocationResult::broadcast(clip_to_platform_limit(self.safety.scrub(&text))),
            state,
        }
    }

    fn faulted(&self, request: &InvocationRequest) -> InvocationReport {
        self.terminal(
            FinalState::Faulted,
            format!(
                "*{} opens their mouth, but the words won't come. Maybe ask again later.*",
                request.persona
            ),
        )
    }

    /// Kick off the post-delivery extraction pass in the background.
    ///
    /// The pass sees the completed exchange: the context history, the topic
    /// the user asked about, and the reply that was just delivered.
    fn spawn_extraction(&self, request: &InvocationRequest, snapshot: ContextSnapshot, response: String) {
        let extractor = Arc::clone(&self.extractor);
        let store = Arc::clone(&self.store);
        let consolidator = Arc::clone(&self.consolidator);
        let key = self.user_key(request);
        let user_name = request.user.0.clone();
        let persona = request.persona.clone();
        let topic = request.topic.clone();

        tokio::spawn(async move {
            let exchange = ExchangeRecord {
                user_name: &user_name,
                persona: &persona,
                history: &snapshot.history,
                topic: topic.as_deref(),
                response: &response,
            };
            extractor
                .run_with_consolidation(&store, &consolidator, &key, &exchange)
                .await;
        });
    }
}

/// Clip to the transport's hard message cap, marking the cut with an
/// ellipsis. Operates on characters so multi-byte content never splits.
fn clip_to_platform_limit(text: String) -> String {
    if text.chars().count() <= PLATFORM_MESSAGE_CAP {
        return text;
    }
    let mut clipped: String = text.chars().take(PLATFORM_MESSAGE_CAP - 4).collect();
    clipped.push_str("...");
    clipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveTime, TimeZone, Utc};
    use skylark_core::backend::{BackendReply, ToolUse};
    use skylark_core::error::{BackendError, TransportError};
    use skylark_core::invocation::{DeliveryMode, InvocationKind};
    use skylark_core::message::{ChannelId, ChannelMessage};
    use skylark_core::transport::TransportClient;
    use skylark_context::AggregatorOptions;
    use skylark_memory::StoreOptions;
    use skylark_safety::QuietHours;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        replies: Mutex<Vec<Result<BackendReply, BackendError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<BackendReply, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }

        fn structured(text: &str, target: Option<&str>) -> Arc<Self> {
            let arguments = serde_json::json!({
                "text": text,
                "reply_to_message_id": target,
            })
            .to_string();
            Self::new(vec![Ok(BackendReply {
                tool_uses: vec![ToolUse {
                    name: "send_chat_message".into(),
                    arguments,
                }],
                text: None,
            })])
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn send(&self, _request: BackendRequest) -> Result<BackendReply, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                return Ok(BackendReply::default());
            }
            replies.remove(0)
        }
    }

    struct FakeTransport {
        history: Vec<ChannelMessage>,
        fail_history: bool,
    }

    #[async_trait]
    impl TransportClient for FakeTransport {
        async fn fetch_history(
            &self,
            channel: &ChannelId,
            _limit: usize,
        ) -> Result<Vec<ChannelMessage>, TransportError> {
            if self.fail_history {
                return Err(TransportError::HistoryFetchFailed {
                    channel_id: channel.0.clone(),
                    reason: "gone".into(),
                });
            }
            Ok(self.history.clone())
        }

        async fn fetch_message(
            &self,
            _channel: &ChannelId,
            _id: &MessageId,
        ) -> Result<Option<ChannelMessage>, TransportError> {
            Ok(None)
        }

        async fn is_thread(&self, _channel: &ChannelId) -> Result<bool, TransportError> {
            Ok(false)
        }
    }

    fn msg(id: &str, content: &str) -> ChannelMessage {
        ChannelMessage {
            id: MessageId(id.into()),
            author: "alice".into(),
            content: content.into(),
            timestamp: Utc::now(),
            from_bot: false,
            image_urls: vec![],
            reply_to: None,
        }
    }

    fn request() -> InvocationRequest {
        InvocationRequest {
            persona: "captain".into(),
            topic: None,
            user: UserId("u1".into()),
            channel: ChannelId("general".into()),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
            kind: InvocationKind::Command,
            reply_seed: None,
            trigger: None,
        }
    }

    fn build(
        backend: Arc<ScriptedBackend>,
        safety: SafetyFilter,
        history: Vec<ChannelMessage>,
        fail_history: bool,
    ) -> Orchestrator {
        let store = Arc::new(MemoryStore::in_memory(StoreOptions::default()));
        let aggregator = Arc::new(ContextAggregator::new(
            Arc::new(FakeTransport {
                history,
                fail_history,
            }),
            AggregatorOptions::default(),
        ));
        let extractor = Arc::new(MemoryExtractor::new(
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            "mini",
        ));
        let consolidator = Arc::new(Consolidator::new(
            Arc::clone(&backend) as Arc<dyn ChatBackend>,
            "mini",
            0.5,
        ));
        Orchestrator::new(
            backend,
            store,
            Arc::new(safety),
            aggregator,
            extractor,
            consolidator,
            OrchestratorOptions::default(),
        )
    }

    fn open_safety() -> SafetyFilter {
        SafetyFilter::new(100, &[], None)
    }

    #[tokio::test]
    async fn quiet_hours_short_circuit_without_a_model_call() {
        let backend = ScriptedBackend::structured("should not run", None);
        let quiet = QuietHours::new(
            NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
        );
        let orchestrator = build(
            Arc::clone(&backend),
            SafetyFilter::new(100, &[], Some(quiet)),
            vec![],
            false,
        );

        let mut req = request();
        req.timestamp = Utc.with_ymd_and_hms(2026, 3, 14, 3, 0, 0).unwrap();
        let report = orchestrator.run(&req).await.unwrap();

        assert_eq!(report.state, FinalState::QuietHours);
        assert!(report.result.text.contains("captain"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn rate_limit_short_circuits_on_the_second_call() {
        let backend = ScriptedBackend::new(vec![
            Ok(BackendReply {
                tool_uses: vec![ToolUse {
                    name: "send_chat_message".into(),
                    arguments: r#"{"text":"hi","reply_to_message_id":null}"#.into(),
                }],
                text: None,
            }),
        ]);
        let orchestrator = build(Arc::clone(&backend), SafetyFilter::new(1, &[], None), vec![], false);

        let first = orchestrator.run(&request()).await.unwrap();
        assert_eq!(first.state, FinalState::Delivered);

        let second = orchestrator.run(&request()).await.unwrap();
        assert_eq!(second.state, FinalState::RateLimited);
        assert_eq!(second.result.mode, DeliveryMode::Broadcast);
    }

    #[tokio::test]
    async fn structured_reply_with_known_target_is_a_reply() {
        let backend = ScriptedBackend::structured("ahoy", Some("7"));
        let orchestrator = build(backend, open_safety(), vec![msg("7", "hello there")], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.state, FinalState::Delivered);
        assert_eq!(report.result.mode, DeliveryMode::Reply);
        assert_eq!(report.result.reply_to, Some(MessageId("7".into())));
        assert_eq!(report.result.text, "ahoy");
    }

    #[tokio::test]
    async fn unknown_target_downgrades_to_broadcast() {
        let backend = ScriptedBackend::structured("ahoy", Some("999"));
        let orchestrator = build(backend, open_safety(), vec![msg("7", "hello there")], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.result.mode, DeliveryMode::Broadcast);
        assert!(report.result.reply_to.is_none());
    }

    #[tokio::test]
    async fn malformed_call_falls_back_to_free_text() {
        let backend = ScriptedBackend::new(vec![Ok(BackendReply {
            tool_uses: vec![ToolUse {
                name: "send_chat_message".into(),
                arguments: "{{{".into(),
            }],
            text: Some("a plain answer".into()),
        })]);
        let orchestrator = build(backend, open_safety(), vec![], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.state, FinalState::Delivered);
        assert_eq!(report.result.text, "a plain answer");
        assert_eq!(report.result.mode, DeliveryMode::Broadcast);
    }

    #[tokio::test]
    async fn fully_empty_reply_yields_the_placeholder() {
        let backend = ScriptedBackend::new(vec![Ok(BackendReply::default())]);
        let orchestrator = build(backend, open_safety(), vec![], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.state, FinalState::Delivered);
        assert!(report.result.text.contains("captain"));
        assert!(report.result.text.contains("lost for words"));
    }

    #[tokio::test]
    async fn output_is_scrubbed() {
        let backend = ScriptedBackend::structured("this is spam, honestly", None);
        let orchestrator = build(
            backend,
            SafetyFilter::new(100, &["spam".to_string()], None),
            vec![],
            false,
        );

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.result.text, "this is ***, honestly");
    }

    #[tokio::test]
    async fn long_output_is_clipped_to_the_platform_cap() {
        let long = "x".repeat(2500);
        let backend = ScriptedBackend::structured(&long, None);
        let orchestrator = build(backend, open_safety(), vec![], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.result.text.chars().count(), 1999);
        assert!(report.result.text.ends_with("..."));
    }

    #[tokio::test]
    async fn backend_fault_becomes_an_in_character_apology() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::ApiError {
            status_code: 500,
            message: "oops".into(),
        })]);
        let orchestrator = build(backend, open_safety(), vec![], false);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.state, FinalState::Faulted);
        assert!(report.result.text.contains("captain"));
        assert!(!report.result.text.contains("oops"));
    }

    #[tokio::test]
    async fn cancellation_propagates_as_an_error() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Cancelled)]);
        let orchestrator = build(backend, open_safety(), vec![], false);

        let result = orchestrator.run(&request()).await;
        assert!(matches!(
            result,
            Err(Error::Backend(BackendError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn history_fetch_failure_faults_without_a_model_call() {
        let backend = ScriptedBackend::structured("should not run", None);
        let orchestrator = build(Arc::clone(&backend), open_safety(), vec![], true);

        let report = orchestrator.run(&request()).await.unwrap();
        assert_eq!(report.state, FinalState::Faulted);
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn escape_hatches_touch_the_store_directly() {
        let backend = ScriptedBackend::new(vec![]);
        let orchestrator = build(Arc::clone(&backend), open_safety(), vec![], false);

        let user = UserId("u1".into());
        orchestrator
            .store
            .save(&UserKey::global(&user), "likes tea", "breakfast")
            .await;

        let listed = orchestrator.list_memories(&user, "captain").await;
        assert_eq!(listed.len(), 1);

        orchestrator.forget_user(&user, "captain").await;
        assert!(orchestrator.list_memories(&user, "captain").await.is_empty());
        assert_eq!(backend.calls(), 0);
    }

    #[test]
    fn options_derive_from_config() {
        let config =
            AppConfig::from_toml_str("[memory]\ninject_limit = 5\nscope_per_persona = true\n")
                .unwrap();
        let options = OrchestratorOptions::from_config(&config);
        assert_eq!(options.memory_inject_limit, 5);
        assert!(options.scope_per_persona);
        assert_eq!(options.chat_model, "gpt-4o");
    }

    #[test]
    fn clipping_preserves_short_text() {
        assert_eq!(clip_to_platform_limit("short".into()), "short");
        let exact = "y".repeat(2000);
        assert_eq!(clip_to_platform_limit(exact.clone()), exact);
    }
}
