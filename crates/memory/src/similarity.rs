//! Textual and vector similarity used by the deduplication pre-filter.
//!
//! Pure-Rust implementations of:
//! - Sørensen–Dice bigram ratio (fast textual pre-filter)
//! - Cosine similarity (embedding-level paraphrase check)

use std::collections::HashMap;

/// Compute the Sørensen–Dice similarity of two strings over character
/// bigrams, case-insensitive.
///
/// Returns a value in [0, 1] where 1 means the bigram multisets are
/// identical. Strings shorter than two characters only match exactly.
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    if a == b {
        return 1.0;
    }

    let bigrams_a = bigrams(&a);
    let bigrams_b = bigrams(&b);
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for bg in &bigrams_a {
        *counts.entry(*bg).or_default() += 1;
    }

    let mut overlap = 0usize;
    for bg in &bigrams_b {
        if let Some(count) = counts.get_mut(bg) {
            if *count > 0 {
                *count -= 1;
                overlap += 1;
            }
        }
    }

    (2.0 * overlap as f64) / (bigrams_a.len() + bigrams_b.len()) as f64
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if either vector is zero-length, empty, or the lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_strings_are_1() {
        assert_eq!(text_similarity("loves rust", "loves rust"), 1.0);
    }

    #[test]
    fn case_is_ignored() {
        assert_eq!(text_similarity("Loves Rust", "loves rust"), 1.0);
    }

    #[test]
    fn near_duplicates_score_high() {
        let sim = text_similarity("the user loves hiking", "the user loves hiking!");
        assert!(sim > 0.9, "expected > 0.9, got {sim}");
    }

    #[test]
    fn unrelated_strings_score_low() {
        let sim = text_similarity("prefers dark roast coffee", "owns three parakeets");
        assert!(sim < 0.3, "expected < 0.3, got {sim}");
    }

    #[test]
    fn short_strings_only_match_exactly() {
        assert_eq!(text_similarity("a", "a"), 1.0);
        assert_eq!(text_similarity("a", "b"), 0.0);
        assert_eq!(text_similarity("", ""), 1.0);
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_or_empty() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
