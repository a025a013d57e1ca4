//! Near-miss suggestions for not-found intake rejections.
//!
//! A missing control or framework usually means a typo'd key. Rather than
//! a bare 404, intake returns the closest known keys: Levenshtein distance
//! ascending, ties broken lexicographically, capped at
//! [`MAX_SUGGESTIONS`].

/// Maximum suggestions attached to a not-found response.
pub const MAX_SUGGESTIONS: usize = 10;

/// Classic two-row Levenshtein edit distance over Unicode scalars.
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Ranks candidate keys by distance to `input` and returns the best
/// [`MAX_SUGGESTIONS`].
#[must_use]
pub fn rank_suggestions(input: &str, candidates: Vec<String>) -> Vec<String> {
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .map(|candidate| (levenshtein(input, &candidate), candidate))
        .collect();
    scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(MAX_SUGGESTIONS)
        .map(|(_, candidate)| candidate)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("AC-1", "AC-2"), 1);
    }

    #[test]
    fn ranking_prefers_closer_keys() {
        let candidates = vec![
            "NIST-SP-800-53#R5#AC-10".to_string(),
            "NIST-SP-800-53#R5#AC-1".to_string(),
            "NIST-SP-800-53#R5#SC-7".to_string(),
        ];
        let ranked = rank_suggestions("NIST-SP-800-53#R5#AC-1", candidates);
        assert_eq!(ranked[0], "NIST-SP-800-53#R5#AC-1");
        assert_eq!(ranked[1], "NIST-SP-800-53#R5#AC-10");
    }

    #[test]
    fn ties_break_lexicographically() {
        let candidates = vec!["AC-3".to_string(), "AC-2".to_string(), "AC-9".to_string()];
        let ranked = rank_suggestions("AC-1", candidates);
        assert_eq!(ranked, ["AC-2", "AC-3", "AC-9"]);
    }

    #[test]
    fn output_is_capped() {
        let candidates: Vec<String> = (0..50).map(|i| format!("AC-{i}")).collect();
        let ranked = rank_suggestions("AC-1", candidates);
        assert_eq!(ranked.len(), MAX_SUGGESTIONS);
    }
}
