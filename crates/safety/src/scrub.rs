//! Block-word scrubbing.
//!
//! Every case-insensitive occurrence of a configured block word is replaced
//! with a fixed mask token. The alternation pattern is compiled once and
//! rebuilt only when the configured word list changes by value, so the list
//! can be updated at runtime without a restart.

use regex_lite::Regex;
use std::sync::Mutex;
use tracing::debug;

/// The token substituted for every blocked word.
pub const MASK: &str = "***";

/// Runtime-configurable block-word scrubber.
pub struct WordScrubber {
    state: Mutex<ScrubState>,
}

#[derive(Default)]
struct ScrubState {
    words: Vec<String>,
    pattern: Option<Regex>,
}

impl WordScrubber {
    /// Create a scrubber with an initial word list.
    pub fn new(words: &[String]) -> Self {
        let scrubber = Self {
            state: Mutex::new(ScrubState::default()),
        };
        scrubber.set_block_words(words);
        scrubber
    }

    /// Replace the configured word list.
    ///
    /// The compiled pattern is rebuilt only when the list actually differs
    /// from the current one (value comparison, not reference).
    pub fn set_block_words(&self, words: &[String]) {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if state.words == words {
            return;
        }

        state.words = words.to_vec();
        state.pattern = build_pattern(words);
        debug!(count = words.len(), "Rebuilt block-word pattern");
    }

    /// Replace every case-insensitive block-word occurrence with the mask.
    pub fn scrub(&self, text: &str) -> String {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match &state.pattern {
            Some(pattern) => pattern.replace_all(text, MASK).into_owned(),
            None => text.to_string(),
        }
    }
}

fn build_pattern(words: &[String]) -> Option<Regex> {
    let escaped: Vec<String> = words
        .iter()
        .filter(|w| !w.trim().is_empty())
        .map(|w| escape(w.trim()))
        .collect();
    if escaped.is_empty() {
        return None;
    }

    match Regex::new(&format!("(?i)(?:{})", escaped.join("|"))) {
        Ok(pattern) => Some(pattern),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to compile block-word pattern, scrubbing disabled");
            None
        }
    }
}

/// Escape regex metacharacters in a block word.
fn escape(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    for c in word.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == ' ' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn masks_configured_word() {
        let scrubber = WordScrubber::new(&words(&["spam"]));
        assert_eq!(scrubber.scrub("this is spam"), "this is ***");
    }

    #[test]
    fn matching_is_case_insensitive() {
        let scrubber = WordScrubber::new(&words(&["spam"]));
        assert_eq!(scrubber.scrub("SPAM and Spam"), "*** and ***");
    }

    #[test]
    fn masks_all_words_in_list() {
        let scrubber = WordScrubber::new(&words(&["spam", "junk"]));
        assert_eq!(scrubber.scrub("spam or junk"), "*** or ***");
    }

    #[test]
    fn empty_list_is_passthrough() {
        let scrubber = WordScrubber::new(&[]);
        assert_eq!(scrubber.scrub("anything goes"), "anything goes");
    }

    #[test]
    fn runtime_list_change_takes_effect() {
        let scrubber = WordScrubber::new(&words(&["spam"]));
        assert_eq!(scrubber.scrub("spam and ham"), "*** and ham");

        scrubber.set_block_words(&words(&["ham"]));
        assert_eq!(scrubber.scrub("spam and ham"), "spam and ***");
    }

    #[test]
    fn metacharacters_in_words_are_literal() {
        let scrubber = WordScrubber::new(&words(&["a.b"]));
        assert_eq!(scrubber.scrub("a.b"), "***");
        assert_eq!(scrubber.scrub("axb"), "axb");
    }
}
