//! Local keyword extraction

use std::collections::HashSet;

/// Words carrying no retrieval signal
const STOP_WORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "but", "by", "can", "could", "do", "does", "for", "from", "get", "had", "has",
    "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "just",
    "like", "me", "more", "my", "no", "not", "of", "on", "or", "our", "she", "so", "some",
    "than", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to",
    "up", "us", "was", "we", "were", "what", "when", "where", "which", "who", "why", "will",
    "with", "would", "you", "your",
    // request phrasing
    "find", "help", "interested", "join", "looking", "need", "please", "project", "projects",
    "recommend", "something", "want", "work", "working",
];

/// Tokenize, drop stopwords and short tokens, deduplicate preserving order.
///
/// Splits on anything that is not alphanumeric, so CJK runs stay whole.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let mut seen = HashSet::new();

    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .filter(|token| !is_noise(token))
        .filter(|token| seen.insert(token.clone()))
        .take(max_keywords)
        .collect()
}

fn is_noise(token: &str) -> bool {
    if STOP_WORDS.contains(&token) {
        return true;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    token.is_ascii() && token.len() < 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_stopwords_and_dedups() {
        let keywords = extract_keywords(
            "I want a Rust project about compilers, compilers and Rust tooling",
            10,
        );
        assert_eq!(keywords, vec!["rust", "compilers", "tooling"]);
    }

    #[test]
    fn test_respects_cap() {
        let keywords = extract_keywords("alpha beta gamma delta epsilon", 3);
        assert_eq!(keywords, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_keeps_cjk_and_drops_numbers() {
        let keywords = extract_keywords("机器学习 project 2024 x ml", 10);
        assert_eq!(keywords, vec!["机器学习", "ml"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(extract_keywords("", 8).is_empty());
        assert!(extract_keywords("  the and of ", 8).is_empty());
    }
}
