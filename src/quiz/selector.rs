use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::quiz::tracker::AccuracyTracker;
use crate::quiz::word_bank::WordBank;
use crate::quiz::QuizItem;

pub const DEFAULT_QUESTION_COUNT: usize = 10;
/// Longest quiz a learner can ask for.
pub const MAX_QUESTION_COUNT: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SelectionMode {
    #[default]
    Normal,
    /// Weak words come up more often; the same word may be asked twice.
    Weighted,
    /// Only the words missed in the previous session.
    Review,
}

/// Uniform pick of `min(n, bank size)` distinct items.
pub fn select_normal<R: Rng + ?Sized>(bank: &WordBank, n: usize, rng: &mut R) -> Vec<QuizItem> {
    bank.items()
        .choose_multiple(rng, n.min(bank.len()))
        .cloned()
        .collect()
}

/// `n` draws with replacement, each item weighted by how badly the learner has done on it.
pub fn select_weighted<R: Rng + ?Sized>(
    bank: &WordBank,
    tracker: &AccuracyTracker,
    n: usize,
    rng: &mut R,
) -> Vec<QuizItem> {
    if bank.is_empty() || n == 0 {
        return Vec::new();
    }
    let n = n.min(MAX_QUESTION_COUNT);
    let weights = bank.items().iter().map(|item| tracker.weight(&item.id));
    // Weights are always within (0, 1], so this only fails on an empty bank, handled above.
    let distribution = match WeightedIndex::new(weights) {
        Ok(distribution) => distribution,
        Err(err) => {
            log::error!("Could not build weighted distribution: {}", err);
            return select_normal(bank, n, rng);
        }
    };
    (0..n)
        .map(|_| bank.items()[distribution.sample(rng)].clone())
        .collect()
}

/// Restricted to `missed`. Never padded: with `n` or fewer missed items all of
/// them come back in their original order.
pub fn select_review<R: Rng + ?Sized>(missed: &[QuizItem], n: usize, rng: &mut R) -> Vec<QuizItem> {
    if missed.len() <= n {
        return missed.to_vec();
    }
    missed.choose_multiple(rng, n).cloned().collect()
}

pub fn select<R: Rng + ?Sized>(
    mode: SelectionMode,
    bank: &WordBank,
    tracker: &AccuracyTracker,
    missed: &[QuizItem],
    n: usize,
    rng: &mut R,
) -> Vec<QuizItem> {
    let n = n.min(MAX_QUESTION_COUNT);
    let selected = match mode {
        SelectionMode::Normal => select_normal(bank, n, rng),
        SelectionMode::Weighted => select_weighted(bank, tracker, n, rng),
        SelectionMode::Review => select_review(missed, n, rng),
    };
    log::debug!(
        "Selected {} of {} requested items in {:?} mode",
        selected.len(),
        n,
        mode
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::test_support::item;
    use rand::rngs::StdRng;
    use std::collections::HashSet;

    const WORDS: &str = "\
id,prompt_text,choices,correct_choice
weak,p,weak|w2,weak
strong,p,strong|s2,strong
third,p,third|t2,third
";

    fn bank() -> WordBank {
        WordBank::load(WORDS.as_bytes()).unwrap().0
    }

    #[test]
    fn normal_mode_caps_at_bank_size_without_repeats() {
        let bank = bank();
        let mut rng = StdRng::seed_from_u64(1);

        let two = select_normal(&bank, 2, &mut rng);
        assert_eq!(two.len(), 2);
        assert_ne!(two[0].id, two[1].id);

        let all = select_normal(&bank, 10, &mut rng);
        let ids: HashSet<_> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(all.len(), 3);
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn weighted_mode_draws_with_replacement() {
        let bank = bank();
        let tracker = AccuracyTracker::in_memory("u");
        let mut rng = StdRng::seed_from_u64(2);
        let picked = select_weighted(&bank, &tracker, 20, &mut rng);
        assert_eq!(picked.len(), 20);
        assert!(picked.iter().all(|i| bank.get(&i.id).is_some()));
    }

    #[test]
    fn weighted_mode_without_history_is_uniform() {
        let bank = bank();
        let tracker = AccuracyTracker::in_memory("u");
        let mut rng = StdRng::seed_from_u64(8);
        let mut counts = std::collections::HashMap::new();
        for _ in 0..60 {
            for item in select_weighted(&bank, &tracker, MAX_QUESTION_COUNT, &mut rng) {
                *counts.entry(item.id).or_insert(0usize) += 1;
            }
        }
        // 3000 draws over 3 items: each should land near 1000.
        assert_eq!(counts.len(), 3);
        for (id, count) in &counts {
            assert!((850..=1150).contains(count), "{} drawn {} times", id, count);
        }
    }

    #[test]
    fn huge_requests_are_capped() {
        let bank = bank();
        let tracker = AccuracyTracker::in_memory("u");
        let mut rng = StdRng::seed_from_u64(9);
        let n: usize = "18446744073709551615".parse().unwrap();

        assert_eq!(select_weighted(&bank, &tracker, n, &mut rng).len(), MAX_QUESTION_COUNT);
        assert_eq!(
            select(SelectionMode::Weighted, &bank, &tracker, &[], n, &mut rng).len(),
            MAX_QUESTION_COUNT
        );
        assert_eq!(select(SelectionMode::Normal, &bank, &tracker, &[], n, &mut rng).len(), 3);
    }

    #[test]
    fn weighted_mode_favours_weak_items() {
        let bank = bank();
        let mut tracker = AccuracyTracker::in_memory("u");
        for _ in 0..5 {
            tracker.record("weak", "w2", false).unwrap();
            tracker.record("strong", "strong", true).unwrap();
            tracker.record("third", "third", true).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(3);
        let picked: Vec<_> = (0..20)
            .flat_map(|_| select_weighted(&bank, &tracker, MAX_QUESTION_COUNT, &mut rng))
            .collect();
        let weak = picked.iter().filter(|i| i.id == "weak").count();
        let strong = picked.iter().filter(|i| i.id == "strong").count();
        assert!(weak > strong * 3, "weak={} strong={}", weak, strong);
        assert!(strong > 0);
    }

    #[test]
    fn review_mode_is_never_padded() {
        let b = item("B", "y");
        let mut rng = StdRng::seed_from_u64(4);
        let picked = select_review(&[b.clone(), b.clone()], 5, &mut rng);
        assert_eq!(picked, vec![b.clone(), b]);
    }

    #[test]
    fn review_mode_trims_to_the_requested_count() {
        let missed: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| item(id, "x")).collect();
        let mut rng = StdRng::seed_from_u64(5);
        let picked = select_review(&missed, 2, &mut rng);
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|p| missed.contains(p)));
    }

    #[test]
    fn select_dispatches_on_mode() {
        let bank = bank();
        let tracker = AccuracyTracker::in_memory("u");
        let mut rng = StdRng::seed_from_u64(6);
        assert_eq!(SelectionMode::default(), SelectionMode::Normal);
        assert_eq!(
            select(SelectionMode::Review, &bank, &tracker, &[], 5, &mut rng).len(),
            0
        );
        assert_eq!(
            select(SelectionMode::Normal, &bank, &tracker, &[], 5, &mut rng).len(),
            3
        );
        assert_eq!(
            select(SelectionMode::Weighted, &bank, &tracker, &[], 5, &mut rng).len(),
            5
        );
    }
}
