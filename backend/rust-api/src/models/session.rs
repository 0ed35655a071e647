use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::question::{Difficulty, Question, QuestionView};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Primary,
    Supplementary,
    Retry,
}

/// The one current batch of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub kind: BatchKind,
    pub questions: Vec<Question>,
    pub index: usize,
}

impl Batch {
    pub fn new(kind: BatchKind, questions: Vec<Question>) -> Self {
        Self {
            kind,
            questions,
            index: 0,
        }
    }

    pub fn empty() -> Self {
        Self::new(BatchKind::Primary, Vec::new())
    }

    pub fn current(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.questions.len()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// One submitted answer. Append-only within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub lesson: u8,
    pub difficulty: Difficulty,
    pub batch_kind: BatchKind,
    pub chosen: String,
    pub correct: bool,
    pub time_spent_ms: u64,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupportReason {
    /// Primary batch failed and no supplementary question matched.
    NoRemediation,
    /// The single supplementary round was used up.
    SupplementaryExhausted,
    /// A retry batch after AI support failed again.
    RetryFailed,
}

/// Theory and worked example for a topic, shown during AI support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportContent {
    pub theory: String,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportRound {
    pub id: String,
    pub topic: String,
    pub reason: SupportReason,
    pub content: SupportContent,
    pub opened_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Phase {
    Intro,
    Testing,
    AiSupport(SupportRound),
    Results,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Intro => "intro",
            Phase::Testing => "testing",
            Phase::AiSupport(_) => "ai_support",
            Phase::Results => "results",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSession {
    pub id: String,
    pub user_id: String,
    /// Bumped on every persisted transition; used for compare-and-set.
    pub version: u64,
    pub phase: Phase,
    pub tier: Difficulty,
    pub batch: Batch,
    pub answers: Vec<AnswerRecord>,
    /// Lessons with a wrong answer at the current tier. Cleared on tier advance.
    pub failed_lessons: BTreeSet<u8>,
    pub support_rounds: u32,
    /// Review id of the last consumed support round, until the next answer.
    pub resumed_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TestSession {
    pub fn new(id: String, user_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id,
            version: 0,
            phase: Phase::Intro,
            tier: Difficulty::Recognition,
            batch: Batch::empty(),
            answers: Vec::new(),
            failed_lessons: BTreeSet::new(),
            support_rounds: 0,
            resumed_from: None,
            created_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn ai_support_required(&self) -> bool {
        matches!(self.phase, Phase::AiSupport(_))
    }

    pub fn support_round(&self) -> Option<&SupportRound> {
        match &self.phase {
            Phase::AiSupport(round) => Some(round),
            _ => None,
        }
    }

    pub fn correct_count(&self) -> usize {
        self.answers.iter().filter(|a| a.correct).count()
    }

    /// Questions of the current batch whose latest answer in this batch attempt
    /// was wrong, in batch order.
    pub fn missed_in_batch(&self) -> Vec<Question> {
        let answered = self.batch.index.min(self.batch.len());
        let tail_start = self.answers.len().saturating_sub(answered);
        let tail = &self.answers[tail_start..];

        self.batch
            .questions
            .iter()
            .filter(|q| {
                tail.iter()
                    .rev()
                    .find(|a| a.question_id == q.id)
                    .is_some_and(|a| !a.correct)
            })
            .cloned()
            .collect()
    }
}

/// Client-facing snapshot. Never carries correct answers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub user_id: String,
    pub phase: String,
    pub tier: Difficulty,
    pub tier_label: String,
    pub batch_kind: BatchKind,
    pub batch_size: usize,
    pub current_index: usize,
    pub current_question: Option<QuestionView>,
    pub failed_lessons: Vec<u8>,
    pub answered: usize,
    pub correct: usize,
    pub ai_support_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_topic: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&TestSession> for SessionView {
    fn from(s: &TestSession) -> Self {
        let round = s.support_round();
        Self {
            id: s.id.clone(),
            user_id: s.user_id.clone(),
            phase: s.phase.name().to_string(),
            tier: s.tier,
            tier_label: s.tier.label_vi().to_string(),
            batch_kind: s.batch.kind,
            batch_size: s.batch.len(),
            current_index: s.batch.index,
            current_question: match s.phase {
                Phase::Testing => s.batch.current().map(QuestionView::from),
                _ => None,
            },
            failed_lessons: s.failed_lessons.iter().copied().collect(),
            answered: s.answers.len(),
            correct: s.correct_count(),
            ai_support_required: s.ai_support_required(),
            review_id: round.map(|r| r.id.clone()),
            support_topic: round.map(|r| r.topic.clone()),
            version: s.version,
            created_at: s.created_at,
            started_at: s.started_at,
            ended_at: s.ended_at,
        }
    }
}

/// The batch a learner is about to answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchBundle {
    pub kind: BatchKind,
    pub tier: Difficulty,
    pub index: usize,
    pub questions: Vec<QuestionView>,
}

impl BatchBundle {
    pub fn of(session: &TestSession) -> Self {
        Self {
            kind: session.batch.kind,
            tier: session.tier,
            index: session.batch.index,
            questions: session.batch.questions.iter().map(QuestionView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierSummary {
    pub tier: Difficulty,
    pub answered: usize,
    pub correct: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub total_answers: usize,
    pub correct_answers: usize,
    /// Percentage in 0..=100.
    pub accuracy: f64,
    pub tiers: Vec<TierSummary>,
    pub ai_support_rounds: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub total_time_spent_ms: u64,
}
