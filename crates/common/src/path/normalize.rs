// Path normalization for ignore matching: NFKC, separator unification, case folding.

use unicode_normalization::UnicodeNormalization;

/// Split a path into normalized, lowercased, non-empty segments.
///
/// Never fails: an empty or separator-only input yields an empty list.
pub fn segments(input: &str) -> Vec<String> {
    let normalized: String = input.nfkc().collect();
    normalized
        .replace('\\', "/")
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Normalize a single rule entry (directory name or suffix) the same way paths
/// are normalized, without splitting on separators.
pub fn normalize_rule(input: &str) -> String {
    let normalized: String = input.trim().nfkc().collect();
    normalized.to_lowercase()
}
