//! Complexity classification
//!
//! A closed keyword table over the task description. When tokens from
//! several classes appear, the heaviest class wins; descriptions matching
//! nothing are medium.

use crate::task::Complexity;

/// Tokens marking structural, cross-cutting work
const COMPLEX_TOKENS: &[&str] = &["refactor", "architecture", "migrate", "redesign"];

/// Tokens marking feature work
const MEDIUM_TOKENS: &[&str] = &["add", "create", "implement", "feature"];

/// Tokens marking small localized changes
const SIMPLE_TOKENS: &[&str] = &["fix", "update", "change", "modify", "rename", "remove"];

/// Classify a task description by its keywords
#[must_use]
pub fn classify_complexity(description: &str) -> Complexity {
    let lower = description.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let has = |tokens: &[&str]| words.iter().any(|w| tokens.contains(w));

    if has(COMPLEX_TOKENS) {
        Complexity::Complex
    } else if has(MEDIUM_TOKENS) {
        Complexity::Medium
    } else if has(SIMPLE_TOKENS) {
        Complexity::Simple
    } else {
        Complexity::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_classes() {
        assert_eq!(classify_complexity("fix typo in header"), Complexity::Simple);
        assert_eq!(classify_complexity("rename the helper"), Complexity::Simple);
        assert_eq!(classify_complexity("add a biorhythm calculator"), Complexity::Medium);
        assert_eq!(classify_complexity("implement caching"), Complexity::Medium);
        assert_eq!(classify_complexity("refactor the storage layer"), Complexity::Complex);
        assert_eq!(classify_complexity("migrate to the new schema"), Complexity::Complex);
    }

    #[test]
    fn test_heaviest_class_wins() {
        assert_eq!(
            classify_complexity("fix and refactor the parser"),
            Complexity::Complex
        );
        assert_eq!(
            classify_complexity("add a field and fix the docs"),
            Complexity::Medium
        );
    }

    #[test]
    fn test_unmatched_defaults_to_medium() {
        assert_eq!(classify_complexity("polish the landing page"), Complexity::Medium);
        assert_eq!(classify_complexity(""), Complexity::Medium);
    }

    #[test]
    fn test_matching_is_word_bounded() {
        // "prefix" contains "fix" only as a substring
        assert_eq!(classify_complexity("adjust the prefix table"), Complexity::Medium);
    }
}
