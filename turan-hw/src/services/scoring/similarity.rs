//! Transcript similarity scoring
//!
//! Both texts are normalized (whitespace collapsed, lowercased) before
//! comparison. Scores are pure functions of the two inputs and always fall
//! in [0, 1].

use crate::config::SimilarityMetric;

/// Trim and collapse runs of whitespace to single spaces
pub fn clean_transcript(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleaned and lowercased form used for comparison
pub fn normalize_for_comparison(text: &str) -> String {
    clean_transcript(text).to_lowercase()
}

/// Similarity of `transcript` to `expected` under `metric`
pub fn similarity(metric: SimilarityMetric, transcript: &str, expected: &str) -> f64 {
    let a = normalize_for_comparison(transcript);
    let b = normalize_for_comparison(expected);

    let score = match metric {
        SimilarityMetric::SequenceRatio => sequence_ratio(&a, &b),
        SimilarityMetric::NormalizedLevenshtein => strsim::normalized_levenshtein(&a, &b),
    };
    score.clamp(0.0, 1.0)
}

/// 2·M / T where M is the longest common subsequence length in characters
/// and T the combined length; two empty strings score 1.0
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matches = lcs_len(&a, &b);
    (2 * matches) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    // Two rolling rows over the shorter input
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];

    for &lc in long {
        for (j, &sc) in short.iter().enumerate() {
            curr[j + 1] = if lc == sc {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[short.len()]
}
