//! Property tests for the scoring, similarity and gap-merging arithmetic.

use proptest::prelude::*;

use suitecheck_rs::core::report::{quality_score, Rating};
use suitecheck_rs::detectors::coverage::merge_uncovered_lines;
use suitecheck_rs::detectors::similarity::cosine_similarity;

proptest! {
    #[test]
    fn score_stays_in_range(pairs in 0usize..200, redundant in 0usize..200, outdated in 0usize..200, suggestions in 0usize..200) {
        let score = quality_score(pairs, redundant, outdated, suggestions);
        prop_assert!((0.0..=10.0).contains(&score));
        let _ = Rating::from_score(score);
    }

    #[test]
    fn more_findings_never_raise_the_score(pairs in 0usize..40, redundant in 0usize..40, outdated in 0usize..40) {
        let base = quality_score(pairs, redundant, outdated, 0);
        prop_assert!(quality_score(pairs + 1, redundant, outdated, 0) <= base);
        prop_assert!(quality_score(pairs, redundant + 1, outdated, 0) <= base);
        prop_assert!(quality_score(pairs, redundant, outdated + 1, 0) <= base);
    }

    #[test]
    fn cosine_is_symmetric_and_bounded(
        a in prop::collection::vec(-100.0f32..100.0, 8),
        b in prop::collection::vec(-100.0f32..100.0, 8),
    ) {
        let ab = cosine_similarity(&a, &b);
        let ba = cosine_similarity(&b, &a);
        prop_assert_eq!(ab, ba);
        prop_assert!((0.0..=1.0).contains(&ab));
    }

    #[test]
    fn merged_ranges_cover_exactly_the_input(lines in prop::collection::vec(1u32..500, 0..120)) {
        let ranges = merge_uncovered_lines(&lines);

        let mut expected = lines.clone();
        expected.sort_unstable();
        expected.dedup();
        let covered: Vec<u32> = ranges.iter().flat_map(|&(start, end)| start..=end).collect();
        prop_assert_eq!(covered, expected);

        for window in ranges.windows(2) {
            // adjacent ranges always leave at least one line between them
            prop_assert!(window[1].0 > window[0].1 + 1);
        }
    }
}
