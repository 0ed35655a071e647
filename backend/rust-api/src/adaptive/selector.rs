use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::models::{Difficulty, Question};

/// How matching questions are ordered before truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "seed", rename_all = "snake_case")]
pub enum SelectionOrder {
    /// First N matches in bank order.
    #[default]
    BankOrder,
    /// Deterministic shuffle of the matches, then the first N.
    Seeded(u64),
}

/// Questions of exactly `difficulty`, in bank order, at most `size` of them.
pub fn select_batch(bank: &[Question], difficulty: Difficulty, size: usize) -> Vec<Question> {
    bank.iter()
        .filter(|q| q.difficulty == difficulty)
        .take(size)
        .cloned()
        .collect()
}

/// Remediation questions: `difficulty` matches and the lesson is one the
/// learner failed. An empty result means no remediation material exists.
pub fn select_supplementary(
    bank: &[Question],
    difficulty: Difficulty,
    failed_lessons: &BTreeSet<u8>,
    size: usize,
) -> Vec<Question> {
    bank.iter()
        .filter(|q| q.difficulty == difficulty && failed_lessons.contains(&q.lesson))
        .take(size)
        .cloned()
        .collect()
}

/// [`select_batch`] with a configurable order. `salt` varies the shuffle per
/// tier or session while keeping it reproducible.
pub fn select_batch_ordered(
    bank: &[Question],
    difficulty: Difficulty,
    size: usize,
    order: SelectionOrder,
    salt: u64,
) -> Vec<Question> {
    match order {
        SelectionOrder::BankOrder => select_batch(bank, difficulty, size),
        SelectionOrder::Seeded(seed) => {
            let matching: Vec<Question> = bank
                .iter()
                .filter(|q| q.difficulty == difficulty)
                .cloned()
                .collect();
            shuffle_take(matching, seed ^ salt, size)
        }
    }
}

pub fn select_supplementary_ordered(
    bank: &[Question],
    difficulty: Difficulty,
    failed_lessons: &BTreeSet<u8>,
    size: usize,
    order: SelectionOrder,
    salt: u64,
) -> Vec<Question> {
    match order {
        SelectionOrder::BankOrder => select_supplementary(bank, difficulty, failed_lessons, size),
        SelectionOrder::Seeded(seed) => {
            let matching: Vec<Question> = bank
                .iter()
                .filter(|q| q.difficulty == difficulty && failed_lessons.contains(&q.lesson))
                .cloned()
                .collect();
            shuffle_take(matching, seed ^ salt, size)
        }
    }
}

fn shuffle_take(mut questions: Vec<Question>, seed: u64, size: usize) -> Vec<Question> {
    let mut rng = StdRng::seed_from_u64(seed);
    questions.shuffle(&mut rng);
    questions.truncate(size);
    questions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(id: &str, lesson: u8, difficulty: Difficulty) -> Question {
        Question {
            id: id.to_string(),
            lesson,
            difficulty,
            text: format!("Câu {}", id),
            options: vec!["A".into(), "B".into()],
            correct_answer: "A".into(),
            explanation: String::new(),
            topic: format!("topic-{}", lesson),
            subtopic: String::new(),
        }
    }

    fn bank() -> Vec<Question> {
        vec![
            q("r1", 1, Difficulty::Recognition),
            q("u1", 1, Difficulty::Understanding),
            q("r2", 2, Difficulty::Recognition),
            q("r3", 3, Difficulty::Recognition),
            q("r4", 1, Difficulty::Recognition),
            q("a1", 4, Difficulty::Application),
            q("r5", 2, Difficulty::Recognition),
            q("r6", 5, Difficulty::Recognition),
        ]
    }

    fn ids(questions: &[Question]) -> Vec<&str> {
        questions.iter().map(|q| q.id.as_str()).collect()
    }

    #[test]
    fn select_batch_filters_and_truncates_in_bank_order() {
        let bank = bank();
        let batch = select_batch(&bank, Difficulty::Recognition, 5);
        assert_eq!(ids(&batch), vec!["r1", "r2", "r3", "r4", "r5"]);
        assert!(batch.iter().all(|q| q.difficulty == Difficulty::Recognition));
    }

    #[test]
    fn select_batch_is_prefix_stable() {
        let bank = bank();
        let three = select_batch(&bank, Difficulty::Recognition, 3);
        let five = select_batch(&bank, Difficulty::Recognition, 5);
        assert_eq!(three[..], five[..3]);
    }

    #[test]
    fn select_batch_never_exceeds_size_for_every_tier() {
        let bank = bank();
        for tier in Difficulty::all() {
            for size in 0..8 {
                let batch = select_batch(&bank, tier, size);
                assert!(batch.len() <= size);
                assert!(batch.iter().all(|q| q.difficulty == tier));
            }
        }
    }

    #[test]
    fn supplementary_filters_by_failed_lessons() {
        let bank = bank();
        let failed: BTreeSet<u8> = [1, 2].into_iter().collect();
        let batch = select_supplementary(&bank, Difficulty::Recognition, &failed, 5);
        assert_eq!(ids(&batch), vec!["r1", "r2", "r4", "r5"]);
    }

    #[test]
    fn supplementary_is_empty_without_matching_lessons() {
        let bank = bank();
        let failed: BTreeSet<u8> = [4].into_iter().collect();
        assert!(select_supplementary(&bank, Difficulty::Recognition, &failed, 5).is_empty());
        assert!(select_supplementary(&bank, Difficulty::Recognition, &BTreeSet::new(), 5).is_empty());
    }

    #[test]
    fn seeded_order_is_reproducible_and_filtered() {
        let bank = bank();
        let first = select_batch_ordered(&bank, Difficulty::Recognition, 4, SelectionOrder::Seeded(42), 7);
        let second = select_batch_ordered(&bank, Difficulty::Recognition, 4, SelectionOrder::Seeded(42), 7);
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        assert!(first.iter().all(|q| q.difficulty == Difficulty::Recognition));
    }

    #[test]
    fn bank_order_ignores_salt() {
        let bank = bank();
        let a = select_batch_ordered(&bank, Difficulty::Recognition, 5, SelectionOrder::BankOrder, 1);
        let b = select_batch(&bank, Difficulty::Recognition, 5);
        assert_eq!(a, b);
    }
}
