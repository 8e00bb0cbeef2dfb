//! Safety gating and content scrubbing for Skylark.
//!
//! Pure state, no external calls: a sliding-window rate limiter, a compiled
//! block-word scrubber, and a quiet-hours window, composed into one
//! `SafetyFilter` that the orchestrator consults before and after each
//! model invocation.

pub mod quiet;
pub mod rate;
pub mod scrub;

pub use quiet::QuietHours;
pub use rate::RateLimiter;
pub use scrub::{MASK, WordScrubber};

use chrono::{DateTime, Utc};
use skylark_core::message::ChannelId;

/// The combined safety surface consumed by the orchestrator.
pub struct SafetyFilter {
    limiter: RateLimiter,
    scrubber: WordScrubber,
    quiet: Option<QuietHours>,
}

impl SafetyFilter {
    pub fn new(per_channel_limit: usize, block_words: &[String], quiet: Option<QuietHours>) -> Self {
        Self {
            limiter: RateLimiter::new(per_channel_limit),
            scrubber: WordScrubber::new(block_words),
            quiet,
        }
    }

    /// See [`RateLimiter::should_rate_limit`].
    pub fn should_rate_limit(&self, now: DateTime<Utc>, channel: &ChannelId) -> bool {
        self.limiter.should_rate_limit(now, channel)
    }

    /// See [`WordScrubber::scrub`].
    pub fn scrub(&self, text: &str) -> String {
        self.scrubber.scrub(text)
    }

    /// Update the block-word list at runtime.
    pub fn set_block_words(&self, words: &[String]) {
        self.scrubber.set_block_words(words);
    }

    /// Whether `now` falls inside the configured quiet window, if any.
    pub fn is_quiet_hour(&self, now: DateTime<Utc>) -> bool {
        self.quiet.is_some_and(|q| q.is_quiet_hour(now))
    }
}
