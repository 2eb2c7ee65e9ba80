//! Synthetic review generation, keyword sampling, and review scoring for the
//! customer worker's unit of work.

use rand::Rng;
use shelfstress_config::Dictionary;

/// Builds one review of `word_count` random dictionary words, space-joined —
/// the same shape as a product's name/description.
#[must_use]
pub fn synthetic_review(dictionary: &dyn Dictionary, rng: &mut impl Rng, word_count: u32) -> String {
    join_random_words(dictionary, rng, word_count)
}

fn join_random_words(dictionary: &dyn Dictionary, rng: &mut impl Rng, count: u32) -> String {
    let bound = u64::from(dictionary.len().max(1));
    (0..count).map(|_| dictionary.word(rng.gen_range(0..bound)).to_string()).collect::<Vec<_>>().join(" ")
}

/// Draws `count` plain random dictionary words, with repeats and substring
/// relationships allowed — used for `SelectionCriteriaCount` criteria, which
/// (unlike the keyword search) carries no distinctness requirement.
#[must_use]
pub fn random_words(dictionary: &dyn Dictionary, rng: &mut impl Rng, count: u32) -> Vec<String> {
    let bound = u64::from(dictionary.len().max(1));
    (0..count).map(|_| dictionary.word(rng.gen_range(0..bound)).to_string()).collect()
}

/// An upper bound on draws while hunting for a word that isn't a substring
/// of (and doesn't contain) any word already chosen. Dictionaries sized per
/// sanely configured dictionaries converge in a handful of draws; this only
/// guards against a pathologically small test dictionary looping forever.
const MAX_DRAW_ATTEMPTS: usize = 10_000;

/// Draws `count` keywords from `dictionary`, each distinct and with no
/// substring relationship to any other.
#[must_use]
pub fn random_keywords(dictionary: &dyn Dictionary, rng: &mut impl Rng, count: u32) -> Vec<String> {
    let bound = u64::from(dictionary.len().max(1));
    let mut chosen: Vec<String> = Vec::new();
    let mut attempts = 0;
    while chosen.len() < count as usize && attempts < MAX_DRAW_ATTEMPTS {
        attempts += 1;
        let candidate = dictionary.word(rng.gen_range(0..bound)).to_string();
        let conflicts = chosen
            .iter()
            .any(|existing| existing == &candidate || existing.contains(&candidate) || candidate.contains(existing));
        if !conflicts {
            chosen.push(candidate);
        }
    }
    chosen
}

/// Scores `review` against `criteria` words: criteria are considered
/// longest-first, each substring match contributes its length scaled by a
/// decay factor that halves every time a criterion is *not* found — so
/// reviews matching the longest, most specific criteria score highest, and
/// early misses discount everything that follows.
#[must_use]
pub fn score_review(review: &str, criteria: &[String]) -> f64 {
    let mut ordered: Vec<&String> = criteria.iter().collect();
    ordered.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let mut score = 0.0;
    let mut decay = 1.0;
    for criterion in ordered {
        if review.contains(criterion.as_str()) {
            score += decay * criterion.len() as f64;
        } else {
            decay *= 0.5;
        }
    }
    score
}

/// Picks the index of the highest-scoring review among `reviews` against
/// `criteria`. Ties resolve to the earliest index (stable `max_by`
/// semantics would pick the last; we want deterministic-by-position
/// behavior so replays with the same RNG seed pick the same candidate).
#[must_use]
pub fn argmax_review(reviews: &[String], criteria: &[String]) -> Option<usize> {
    reviews
        .iter()
        .enumerate()
        .map(|(i, r)| (i, score_review(r, criteria)))
        .fold(None, |best: Option<(usize, f64)>, (i, score)| match best {
            Some((_, best_score)) if best_score >= score => best,
            _ => Some((i, score)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use shelfstress_config::VecDictionary;

    fn dict() -> VecDictionary {
        VecDictionary::new(vec![
            "alpha".into(),
            "bravo".into(),
            "charlie".into(),
            "delta".into(),
            "echo".into(),
            "foxtrot".into(),
        ])
    }

    #[test]
    fn synthetic_review_has_requested_word_count() {
        let mut rng = StdRng::seed_from_u64(1);
        let review = synthetic_review(&dict(), &mut rng, 5);
        assert_eq!(review.split_whitespace().count(), 5);
    }

    #[test]
    fn random_words_draws_requested_count() {
        let mut rng = StdRng::seed_from_u64(5);
        let words = random_words(&dict(), &mut rng, 6);
        assert_eq!(words.len(), 6);
    }

    #[test]
    fn random_keywords_are_distinct_and_non_substring() {
        let mut rng = StdRng::seed_from_u64(2);
        let keywords = random_keywords(&dict(), &mut rng, 4);
        assert_eq!(keywords.len(), 4);
        for (i, a) in keywords.iter().enumerate() {
            for (j, b) in keywords.iter().enumerate() {
                if i != j {
                    assert!(!a.contains(b.as_str()), "{a} contains {b}");
                }
            }
        }
    }

    #[test]
    fn exact_match_scores_higher_than_no_match() {
        let criteria = vec!["alpha".to_string(), "bravo".to_string()];
        let hit = score_review("alpha bravo charlie", &criteria);
        let miss = score_review("delta echo foxtrot", &criteria);
        assert!(hit > miss);
    }

    #[test]
    fn longer_criteria_weigh_more_when_both_match() {
        let criteria = vec!["alphabet".to_string(), "ab".to_string()];
        let score = score_review("the alphabet starts with ab", &criteria);
        // Both match; no decay applied, so score = sum of lengths.
        assert_eq!(score, 8.0 + 2.0);
    }

    #[test]
    fn missed_longest_criterion_decays_the_rest() {
        let criteria = vec!["nonexistentword".to_string(), "ab".to_string()];
        let score = score_review("ab", &criteria);
        // "nonexistentword" missed (decay -> 0.5), "ab" found at half weight.
        assert_eq!(score, 0.5 * 2.0);
    }

    #[test]
    fn argmax_picks_best_scoring_and_earliest_on_tie() {
        let criteria = vec!["alpha".to_string()];
        let reviews =
            vec!["nothing here".to_string(), "alpha appears".to_string(), "alpha again".to_string()];
        assert_eq!(argmax_review(&reviews, &criteria), Some(1));
    }

    #[test]
    fn argmax_of_empty_is_none() {
        assert_eq!(argmax_review(&[], &["alpha".to_string()]), None);
    }
}
