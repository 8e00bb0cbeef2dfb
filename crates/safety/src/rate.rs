//! Sliding-window rate limiting.
//!
//! One-hour windows per channel plus a global window capped at a fixed
//! multiple of the per-channel limit. Both windows are checked and recorded
//! under a single critical section so two concurrent invocations cannot both
//! pass the global check.

use chrono::{DateTime, Duration, Utc};
use skylark_core::message::ChannelId;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::debug;

/// The global window holds this multiple of the per-channel limit.
const GLOBAL_MULTIPLE: usize = 3;

/// Sliding one-hour rate limiter over channels.
pub struct RateLimiter {
    per_channel_limit: usize,
    state: Mutex<WindowState>,
}

#[derive(Default)]
struct WindowState {
    channels: HashMap<ChannelId, VecDeque<DateTime<Utc>>>,
    global: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(per_channel_limit: usize) -> Self {
        Self {
            per_channel_limit,
            state: Mutex::new(WindowState::default()),
        }
    }

    /// Whether an invocation at `now` on `channel` must be rejected.
    ///
    /// Returns `true` (recording nothing) when either the channel or global
    /// ceiling is already met; otherwise records `now` in both windows and
    /// returns `false`. Timestamps older than one hour are purged on every
    /// check, so the window slides.
    pub fn should_rate_limit(&self, now: DateTime<Utc>, channel: &ChannelId) -> bool {
        let cutoff = now - Duration::hours(1);
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let window = state.channels.entry(channel.clone()).or_default();
        while window.front().is_some_and(|t| *t <= cutoff) {
            window.pop_front();
        }
        if window.len() >= self.per_channel_limit {
            debug!(channel = %channel, count = window.len(), "Channel rate limit hit");
            return true;
        }

        while state.global.front().is_some_and(|t| *t <= cutoff) {
            state.global.pop_front();
        }
        if state.global.len() >= self.per_channel_limit * GLOBAL_MULTIPLE {
            debug!(count = state.global.len(), "Global rate limit hit");
            return true;
        }

        if let Some(window) = state.channels.get_mut(channel) {
            window.push_back(now);
        }
        state.global.push_back(now);
        false
    }
}
