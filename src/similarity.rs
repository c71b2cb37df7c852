// 📏 Similarity Scorer - Jaro-Winkler over canonical strings
//
// Contract:
// - score(a, b) == score(b, a)
// - score(a, a) == 1.0 for non-empty a
// - score("", _) == 0.0 (empty canonical strings are unmatchable)
// - always within [0, 1]

/// Jaro-Winkler similarity between two canonical strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    // Fixed argument order keeps the greedy match count symmetric
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    strsim::jaro_winkler(first, second).clamp(0.0, 1.0)
}

/// Score two raw strings after canonicalizing both.
pub fn raw_similarity(a: &str, b: &str) -> f64 {
    similarity(
        &crate::canonicalize::canonicalize(a),
        &crate::canonicalize::canonicalize(b),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_and_empty() {
        assert_eq!(similarity("reyes builders", "reyes builders"), 1.0);
        assert_eq!(similarity("", "reyes builders"), 0.0);
        assert_eq!(similarity("reyes builders", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn test_spelling_variants_score_high() {
        let score = raw_similarity("JC Reyes Construction Inc.", "JC REYES CONSTRUCTON");
        assert!(score > 0.92, "score was {}", score);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let score = raw_similarity("JC Reyes Construction", "Pacific Dredging Services");
        assert!(score < 0.85, "score was {}", score);
    }

    #[test]
    fn test_legal_suffix_does_not_matter() {
        assert_eq!(raw_similarity("Mega Builders Corp.", "MEGA BUILDERS"), 1.0);
    }

    proptest! {
        #[test]
        fn similarity_is_symmetric_and_bounded(a in "[a-z ]{0,30}", b in "[a-z ]{0,30}") {
            let ab = similarity(&a, &b);
            let ba = similarity(&b, &a);
            prop_assert_eq!(ab, ba);
            prop_assert!((0.0..=1.0).contains(&ab));
        }

        #[test]
        fn self_similarity_is_one(a in "[a-z]{1,30}") {
            prop_assert_eq!(similarity(&a, &a), 1.0);
        }
    }
}
