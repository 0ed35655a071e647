use serde::{Deserialize, Serialize};

use crate::models::{AnswerRecord, Difficulty, SessionSummary, TestSession, TierSummary};

/// Outcome of grading one completed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchVerdict {
    pub correct: usize,
    pub total: usize,
    pub required: usize,
    pub passed: bool,
}

/// Passes iff at least `pass_threshold` of `answers` are correct.
///
/// Callers pass only the tail slice belonging to the batch just completed,
/// never the whole history.
pub fn evaluate(answers: &[AnswerRecord], pass_threshold: usize) -> bool {
    answers.iter().filter(|a| a.correct).count() >= pass_threshold
}

/// The last `len` answers, i.e. the ones belonging to a batch of that size.
pub fn batch_tail(answers: &[AnswerRecord], len: usize) -> &[AnswerRecord] {
    &answers[answers.len().saturating_sub(len)..]
}

/// Threshold for a batch of `len` questions, scaled from the configured
/// `pass_threshold` out of `batch_size`. A full batch gets the threshold as is.
pub fn required_correct(pass_threshold: usize, batch_size: usize, len: usize) -> usize {
    if len >= batch_size || batch_size == 0 {
        return pass_threshold;
    }
    (pass_threshold * len).div_ceil(batch_size).max(1)
}

/// Grades the last `batch_len` answers.
///
/// A full batch passes with `pass_threshold` correct. A shorter batch (a
/// retry of the missed questions, or a tier with fewer than `batch_size`
/// questions) needs `ceil(pass_threshold * len / batch_size)`, at least 1,
/// so a one-question retry passes on 1/1 and fails on 0/1.
pub fn grade_batch(
    answers: &[AnswerRecord],
    batch_len: usize,
    pass_threshold: usize,
    batch_size: usize,
) -> BatchVerdict {
    let tail = batch_tail(answers, batch_len);
    let required = required_correct(pass_threshold, batch_size, tail.len());
    BatchVerdict {
        correct: tail.iter().filter(|a| a.correct).count(),
        total: tail.len(),
        required,
        passed: evaluate(tail, required),
    }
}

/// Share of correct answers over the whole session, as a percentage.
pub fn accuracy(answers: &[AnswerRecord]) -> f64 {
    if answers.is_empty() {
        return 0.0;
    }
    let correct = answers.iter().filter(|a| a.correct).count();
    correct as f64 * 100.0 / answers.len() as f64
}

pub fn summarize(session: &TestSession) -> SessionSummary {
    let tiers = Difficulty::all()
        .into_iter()
        .map(|tier| {
            let (answered, correct) = session
                .answers
                .iter()
                .filter(|a| a.difficulty == tier)
                .fold((0, 0), |(n, c), a| (n + 1, c + usize::from(a.correct)));
            TierSummary {
                tier,
                answered,
                correct,
            }
        })
        .collect();

    SessionSummary {
        session_id: session.id.clone(),
        user_id: session.user_id.clone(),
        total_answers: session.answers.len(),
        correct_answers: session.correct_count(),
        accuracy: accuracy(&session.answers),
        tiers,
        ai_support_rounds: session.support_rounds,
        started_at: session.started_at,
        ended_at: session.ended_at,
        duration_seconds: match (session.started_at, session.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        },
        total_time_spent_ms: session.answers.iter().map(|a| a.time_spent_ms).sum(),
    }
}
