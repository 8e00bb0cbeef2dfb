//! Configuration loading, validation, and management for Skylark.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! for secrets. Validates all settings at startup so misconfiguration fails
//! fast instead of surfacing mid-conversation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend API key; overridable via `SKYLARK_API_KEY`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model used for the primary chat call.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Cheaper model used for the decoupled memory-extraction pass.
    #[serde(default = "default_extraction_model")]
    pub extraction_model: String,

    /// Max tokens per primary response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Default persona name.
    #[serde(default = "default_persona")]
    pub persona: String,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub safety: SafetyConfig,

    #[serde(default)]
    pub context: ContextConfig,
}

fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_extraction_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_persona() -> String {
    "skylark".into()
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("chat_model", &self.chat_model)
            .field("extraction_model", &self.extraction_model)
            .field("max_tokens", &self.max_tokens)
            .field("persona", &self.persona)
            .field("memory", &self.memory)
            .field("safety", &self.safety)
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum memories per user key.
    #[serde(default = "default_memory_cap")]
    pub cap: usize,

    /// Consolidation target as a fraction of the cap.
    #[serde(default = "default_consolidation_fraction")]
    pub consolidation_fraction: f64,

    /// Scope memory per (user, persona) instead of per user globally.
    #[serde(default)]
    pub scope_per_persona: bool,

    /// Directory for persisted records; `None` keeps memory ephemeral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persist_dir: Option<String>,

    /// Seconds between debounced flushes of dirty users.
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,

    /// Bigram-ratio dedup threshold.
    #[serde(default = "default_text_dedup_threshold")]
    pub text_dedup_threshold: f64,

    /// Embedding cosine dedup threshold.
    #[serde(default = "default_embedding_dedup_threshold")]
    pub embedding_dedup_threshold: f32,

    /// Maximum memories injected into a prompt.
    #[serde(default = "default_inject_limit")]
    pub inject_limit: usize,
}

fn default_memory_cap() -> usize {
    20
}
fn default_consolidation_fraction() -> f64 {
    0.5
}
fn default_flush_interval_secs() -> u64 {
    30
}
fn default_text_dedup_threshold() -> f64 {
    0.90
}
fn default_embedding_dedup_threshold() -> f32 {
    0.93
}
fn default_inject_limit() -> usize {
    10
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            cap: default_memory_cap(),
            consolidation_fraction: default_consolidation_fraction(),
            scope_per_persona: false,
            persist_dir: None,
            flush_interval_secs: default_flush_interval_secs(),
            text_dedup_threshold: default_text_dedup_threshold(),
            embedding_dedup_threshold: default_embedding_dedup_threshold(),
            inject_limit: default_inject_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Invocations allowed per channel per rolling hour.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_channel: usize,

    /// Words masked in all outgoing text.
    #[serde(default)]
    pub block_words: Vec<String>,

    /// Quiet window start, "HH:MM". Both bounds must be set to enable.
    /// Interpreted at `quiet_utc_offset_minutes` from UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_start: Option<String>,

    /// Quiet window end, "HH:MM".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quiet_end: Option<String>,

    /// Fixed offset from UTC, in minutes, at which the quiet window is
    /// evaluated (e.g., `120` for UTC+2). Zero means plain UTC.
    #[serde(default)]
    pub quiet_utc_offset_minutes: i32,
}

fn default_rate_limit() -> usize {
    10
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_channel: default_rate_limit(),
            block_words: Vec::new(),
            quiet_start: None,
            quiet_end: None,
            quiet_utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default = "default_reply_depth")]
    pub reply_depth: usize,

    #[serde(default = "default_message_char_limit")]
    pub message_char_limit: usize,

    #[serde(default = "default_history_char_budget")]
    pub history_char_budget: usize,

    #[serde(default = "default_reuse_limit")]
    pub reuse_limit: usize,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    #[serde(default = "default_link_timeout_secs")]
    pub link_timeout_secs: u64,

    #[serde(default = "default_max_links")]
    pub max_links: usize,

    /// URL prefixes the link resolver is allowed to fetch.
    #[serde(default)]
    pub recognized_link_prefixes: Vec<String>,
}

fn default_history_limit() -> usize {
    50
}
fn default_reply_depth() -> usize {
    40
}
fn default_message_char_limit() -> usize {
    500
}
fn default_history_char_budget() -> usize {
    10_000
}
fn default_reuse_limit() -> usize {
    2
}
fn default_command_prefix() -> String {
    "!".into()
}
fn default_link_timeout_secs() -> u64 {
    3
}
fn default_max_links() -> usize {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            reply_depth: default_reply_depth(),
            message_char_limit: default_message_char_limit(),
            history_char_budget: default_history_char_budget(),
            reuse_limit: default_reuse_limit(),
            command_prefix: default_command_prefix(),
            link_timeout_secs: default_link_timeout_secs(),
            max_links: default_max_links(),
            recognized_link_prefixes: Vec::new(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: default_chat_model(),
            extraction_model: default_extraction_model(),
            max_tokens: default_max_tokens(),
            persona: default_persona(),
            memory: MemoryConfig::default(),
            safety: SafetyConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from a TOML file, apply environment overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (no env overrides). Used in tests and for
    /// embedded defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SKYLARK_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.cap == 0 {
            return Err(ConfigError::Invalid("memory.cap must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.memory.consolidation_fraction) {
            return Err(ConfigError::Invalid(
                "memory.consolidation_fraction must be in [0, 1]".into(),
            ));
        }
        if self.safety.rate_limit_per_channel == 0 {
            return Err(ConfigError::Invalid(
                "safety.rate_limit_per_channel must be at least 1".into(),
            ));
        }
        if self.safety.quiet_start.is_some() != self.safety.quiet_end.is_some() {
            return Err(ConfigError::Invalid(
                "safety.quiet_start and quiet_end must both be set or both unset".into(),
            ));
        }
        for bound in [&self.safety.quiet_start, &self.safety.quiet_end]
            .into_iter()
            .flatten()
        {
            parse_hhmm(bound).ok_or_else(|| {
                ConfigError::Invalid(format!("invalid quiet-hours time '{bound}', expected HH:MM"))
            })?;
        }
        if self.safety.quiet_utc_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(
                "safety.quiet_utc_offset_minutes must be within a day".into(),
            ));
        }
        if self.context.reply_depth == 0 {
            return Err(ConfigError::Invalid(
                "context.reply_depth must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The quiet window as `(start, end)` minutes from midnight, when
    /// configured. Parsing was validated at load time.
    pub fn quiet_window_minutes(&self) -> Option<((u32, u32), (u32, u32))> {
        let start = parse_hhmm(self.safety.quiet_start.as_deref()?)?;
        let end = parse_hhmm(self.safety.quiet_end.as_deref()?)?;
        Some((start, end))
    }
}

fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h < 24 && m < 60 { Some((h, m)) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.cap, 20);
        assert_eq!(config.context.reply_depth, 40);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            chat_model = "gpt-4o"

            [memory]
            cap = 12

            [safety]
            block_words = ["spam"]
            "#,
        )
        .unwrap();
        assert_eq!(config.memory.cap, 12);
        assert_eq!(config.safety.block_words, vec!["spam".to_string()]);
        assert_eq!(config.context.history_limit, 50);
    }

    #[test]
    fn rejects_zero_cap() {
        let result = AppConfig::from_toml_str("[memory]\ncap = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_half_configured_quiet_window() {
        let result = AppConfig::from_toml_str("[safety]\nquiet_start = \"23:00\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_quiet_time() {
        let result = AppConfig::from_toml_str(
            "[safety]\nquiet_start = \"25:00\"\nquiet_end = \"07:00\"\n",
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn quiet_window_minutes_parses() {
        let config = AppConfig::from_toml_str(
            "[safety]\nquiet_start = \"23:30\"\nquiet_end = \"07:00\"\n",
        )
        .unwrap();
        assert_eq!(config.quiet_window_minutes(), Some(((23, 30), (7, 0))));
    }

    #[test]
    fn quiet_offset_parses_and_is_bounded() {
        let config = AppConfig::from_toml_str(
            "[safety]\nquiet_start = \"23:00\"\nquiet_end = \"07:00\"\nquiet_utc_offset_minutes = 120\n",
        )
        .unwrap();
        assert_eq!(config.safety.quiet_utc_offset_minutes, 120);

        let result =
            AppConfig::from_toml_str("[safety]\nquiet_utc_offset_minutes = 1500\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "persona = \"captain\"\n").unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.persona, "captain");
    }
}
