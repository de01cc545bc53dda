//! Topic pattern matching.
//!
//! Topics are `/`-separated segments. Patterns use the same shape plus two
//! wildcards:
//!
//! - `+` matches exactly one segment of any value
//! - `#` matches the rest of the topic, including nothing at all
//!
//! Matching is case-sensitive and performs no normalization.

/// Segment separator for topics and patterns.
pub const SEPARATOR: char = '/';

/// Single-level wildcard segment.
pub const SINGLE_LEVEL: &str = "+";

/// Multi-level wildcard segment.
pub const MULTI_LEVEL: &str = "#";

/// Returns `true` if `topic` matches any of `patterns`.
///
/// An empty pattern set never matches.
pub fn matches<I, S>(topic: &str, patterns: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .any(|pattern| pattern_matches(pattern.as_ref(), topic))
}

/// Returns `true` if a single `pattern` matches `topic`.
///
/// A `#` segment absorbs everything after it, wherever it sits in the pattern.
/// An empty topic only matches patterns made entirely of wildcards.
pub fn pattern_matches(pattern: &str, topic: &str) -> bool {
    if topic.is_empty() {
        return is_wildcard_only(pattern);
    }

    let mut pattern_segments = pattern.split(SEPARATOR);
    let mut topic_segments = topic.split(SEPARATOR);

    loop {
        match (pattern_segments.next(), topic_segments.next()) {
            (Some(MULTI_LEVEL), _) => return true,
            (Some(SINGLE_LEVEL), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

/// Returns `true` if every segment of `pattern` is a wildcard.
pub fn is_wildcard_only(pattern: &str) -> bool {
    !pattern.is_empty()
        && pattern
            .split(SEPARATOR)
            .all(|segment| segment == SINGLE_LEVEL || segment == MULTI_LEVEL)
}

/// Returns `true` if `topic` may be used in a subscribe or unsubscribe request.
///
/// Subscriptions must be non-empty and contain at least one separator.
pub fn is_valid_subscription(topic: &str) -> bool {
    !topic.is_empty() && topic.contains(SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn exact_match() {
        assert!(matches("a", set(&["a", "b", "c"])));
        assert!(matches("root/sub1/sub2", set(&["root/sub1/sub2"])));
    }

    #[test]
    fn no_match_against_unrelated_literals() {
        assert!(!matches("d", set(&["a", "b", "c"])));
        assert!(!matches("root/sub1/sub2", set(&["root/sub1/sub3"])));
    }

    #[test]
    fn empty_pattern_set_never_matches() {
        assert!(!matches("root/sub1", Vec::<String>::new()));
        assert!(!matches("", Vec::<String>::new()));
    }

    #[test]
    fn hash_matches_everything() {
        assert!(matches("root/sub1/sub2", set(&["#"])));
        assert!(matches("a", set(&["#"])));
    }

    #[test]
    fn trailing_hash_matches_remaining_levels() {
        assert!(matches("root/sub1/sub2", set(&["root/#"])));
        assert!(matches("root/sub1/sub2", set(&["root/sub1/#"])));
        assert!(!matches("root/sub1/sub2", set(&["root/sub1/sub3/#"])));
    }

    #[test]
    fn trailing_hash_matches_zero_levels() {
        assert!(matches("root", set(&["root/#"])));
        assert!(matches("root/sub1", set(&["root/sub1/#"])));
    }

    #[test]
    fn leading_hash_absorbs_the_rest() {
        assert!(matches("root/sub1/sub2", set(&["#/sub1/sub2"])));
        assert!(matches("anything/else", set(&["#/sub1/sub2"])));
    }

    #[test]
    fn plus_matches_exactly_one_level() {
        assert!(matches("root/sub1/sub2", set(&["root/+/sub2"])));
        assert!(matches("root/sub1/sub2", set(&["+/sub1/sub2"])));
        assert!(matches("root/sub1/sub2", set(&["root/sub1/+"])));
        assert!(!matches("root/sub1/sub2", set(&["root/+"])));
        assert!(!matches("root/sub1/sub2", set(&["+/sub2"])));
    }

    #[test]
    fn plus_and_hash_combine() {
        assert!(matches("root/sub1/sub2", set(&["+/#"])));
        assert!(matches("root/sub1/sub2/sub3", set(&["root/+/#"])));
        assert!(!matches("root/sub1/sub2/sub2", set(&["root/sub2/+/sub2"])));
    }

    #[test]
    fn segment_counts_must_agree() {
        assert!(!matches("root/sub1", set(&["root/sub1/sub2"])));
        assert!(!matches("root/sub1/sub2", set(&["root/sub1"])));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!matches("Root/Sub1", set(&["root/sub1"])));
        assert!(!matches("root/sub1", set(&["root/SUB1"])));
    }

    #[test]
    fn empty_topic_only_matches_wildcard_patterns() {
        assert!(matches("", set(&["#"])));
        assert!(matches("", set(&["+"])));
        assert!(matches("", set(&["+/#"])));
        assert!(!matches("", set(&["root"])));
        assert!(!matches("", set(&["root/#"])));
        assert!(!matches("", set(&[""])));
    }

    #[test]
    fn any_pattern_in_set_is_enough() {
        assert!(matches("root/sub1", set(&["other/+", "root/sub1", "x"])));
    }

    #[test]
    fn wildcard_only_detection() {
        assert!(is_wildcard_only("#"));
        assert!(is_wildcard_only("+/+/#"));
        assert!(!is_wildcard_only(""));
        assert!(!is_wildcard_only("+/a"));
    }

    #[test]
    fn subscription_topic_validation() {
        assert!(is_valid_subscription("root/#"));
        assert!(is_valid_subscription("a/b"));
        assert!(!is_valid_subscription(""));
        assert!(!is_valid_subscription("root"));
        assert!(!is_valid_subscription("#"));
    }
}
