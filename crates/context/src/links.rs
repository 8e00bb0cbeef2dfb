//! External link resolution.
//!
//! Recognized URLs in channel history are turned into short inline
//! summaries so the model can refer to linked articles without fetching
//! them itself. Failures degrade silently — a link that cannot be resolved
//! is omitted, never fatal.

use async_trait::async_trait;
use tracing::debug;

/// The seam for turning a URL into a short summary.
#[async_trait]
pub trait LinkResolver: Send + Sync {
    /// Whether this resolver knows how to summarize the given URL.
    fn recognizes(&self, url: &str) -> bool;

    /// Produce a short one-line summary of the linked content.
    async fn resolve(&self, url: &str) -> Result<String, String>;
}

/// Extract `http(s)://` URLs from a text, in encounter order.
pub fn extract_urls(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|token| token.trim_start_matches(['(', '[', '<']))
        .filter(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(|token| token.trim_end_matches(['.', ',', ')', ']', '>']))
        .collect()
}

/// Resolver that fetches recognized pages over HTTP and uses the HTML
/// `<title>` as the summary.
pub struct HttpLinkResolver {
    client: reqwest::Client,
    recognized_prefixes: Vec<String>,
    max_summary_chars: usize,
}

impl HttpLinkResolver {
    pub fn new(recognized_prefixes: Vec<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            recognized_prefixes,
            max_summary_chars: 200,
        }
    }
}

#[async_trait]
impl LinkResolver for HttpLinkResolver {
    fn recognizes(&self, url: &str) -> bool {
        self.recognized_prefixes
            .iter()
            .any(|prefix| url.starts_with(prefix.as_str()))
    }

    async fn resolve(&self, url: &str) -> Result<String, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }
        let body = response.text().await.map_err(|e| e.to_string())?;

        let title = extract_title(&body).unwrap_or_else(|| url.to_string());
        let summary: String = title.chars().take(self.max_summary_chars).collect();
        debug!(url, summary = %summary, "Resolved link");
        Ok(summary)
    }
}

fn extract_title(html: &str) -> Option<String> {
    // Case-insensitive search over the original bytes. Lowercasing a copy
    // would shift byte offsets in non-ASCII text; the tag names themselves
    // are ASCII, so the boundaries found here are valid char boundaries.
    let open = find_ascii_ci(html, "<title", 0)?;
    let start = open + html[open..].find('>')? + 1;
    let end = find_ascii_ci(html, "</title>", start)?;
    let title = html[start..end].trim();
    if title.is_empty() { None } else { Some(title.to_string()) }
}

/// Byte offset of the first ASCII-case-insensitive occurrence of `needle`
/// in `haystack` at or after `from`.
fn find_ascii_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let haystack = haystack.as_bytes();
    let needle = needle.as_bytes();
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
        .map(|i| from + i)
}
