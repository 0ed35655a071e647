use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::models::{
    AnswerFeedback, AnswerRecord, Batch, BatchKind, Difficulty, NavigationView, Phase,
    SupportReason, SupportRound, TestSession,
};

use super::bank::QuestionBank;
use super::scoring::{accuracy, grade_batch, BatchVerdict};
use super::selector::{select_batch_ordered, select_supplementary_ordered, SelectionOrder};
use super::support::SupportCatalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveSettings {
    pub batch_size: usize,
    pub pass_threshold: usize,
    pub supplementary_size: usize,
    pub order: SelectionOrder,
}

impl Default for AdaptiveSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            pass_threshold: 4,
            supplementary_size: 5,
            order: SelectionOrder::BankOrder,
        }
    }
}

impl AdaptiveSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("adaptive.batch_size must be greater than 0".to_string());
        }
        if self.supplementary_size == 0 {
            return Err("adaptive.supplementary_size must be greater than 0".to_string());
        }
        if self.pass_threshold == 0 || self.pass_threshold > self.batch_size {
            return Err(format!(
                "adaptive.pass_threshold must be within 1..={}",
                self.batch_size
            ));
        }
        Ok(())
    }
}

/// Recovery policy after an AI support round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Retry exactly the questions missed in the batch that led to support.
    MissedQuestions,
    /// Fresh remediation from the failed lessons, falling back to the missed
    /// questions when none exist.
    Supplementary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start {
        at: DateTime<Utc>,
    },
    Answer {
        question_id: String,
        chosen: String,
        time_spent_ms: u64,
        at: DateTime<Utc>,
    },
    ContinueAfterSupport {
        review_id: String,
        policy: RetryPolicy,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transition {
    TierAdvanced {
        from: Difficulty,
        to: Difficulty,
    },
    SupplementaryStarted {
        lessons: Vec<u8>,
        size: usize,
    },
    AiSupportEntered {
        review_id: String,
        topic: String,
        reason: SupportReason,
    },
    RetryStarted {
        policy: RetryPolicy,
        size: usize,
    },
    Finished {
        accuracy: f64,
    },
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::TierAdvanced { .. } => "tier_advanced",
            Transition::SupplementaryStarted { .. } => "supplementary_started",
            Transition::AiSupportEntered { .. } => "ai_support_entered",
            Transition::RetryStarted { .. } => "retry_started",
            Transition::Finished { .. } => "finished",
        }
    }

    /// True when the learner now faces a new batch.
    pub fn starts_batch(&self) -> bool {
        matches!(
            self,
            Transition::TierAdvanced { .. }
                | Transition::SupplementaryStarted { .. }
                | Transition::RetryStarted { .. }
        )
    }
}

/// Routing command for the hosting UI. The engine never navigates itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Intro,
    Testing,
    AiSupport { review_id: String, topic: String },
    Results,
}

impl Navigation {
    pub fn for_phase(phase: &Phase) -> Self {
        match phase {
            Phase::Intro => Navigation::Intro,
            Phase::Testing => Navigation::Testing,
            Phase::AiSupport(round) => Navigation::AiSupport {
                review_id: round.id.clone(),
                topic: round.topic.clone(),
            },
            Phase::Results => Navigation::Results,
        }
    }

    pub fn route(&self) -> String {
        match self {
            Navigation::Intro => "/adaptive-test".to_string(),
            Navigation::Testing => "/adaptive-test/questions".to_string(),
            Navigation::AiSupport { review_id, topic } => format!(
                "/adaptive-test/ai-support?topic={}&review={}",
                utf8_percent_encode(topic, NON_ALPHANUMERIC),
                utf8_percent_encode(review_id, NON_ALPHANUMERIC)
            ),
            Navigation::Results => "/adaptive-test/results".to_string(),
        }
    }

    pub fn view(&self) -> NavigationView {
        let target = match self {
            Navigation::Intro => "intro",
            Navigation::Testing => "testing",
            Navigation::AiSupport { .. } => "ai_support",
            Navigation::Results => "results",
        };
        NavigationView {
            target: target.to_string(),
            route: self.route(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressionError {
    #[error("session has not been started")]
    NotStarted,
    #[error("session was already started")]
    AlreadyStarted,
    #[error("session is finished")]
    Finished,
    #[error("session has not reached results yet")]
    NotFinished,
    #[error("session is waiting for AI support to be continued")]
    AwaitingSupport,
    #[error("session is not in AI support")]
    NotInSupport,
    #[error("no current question in batch")]
    NoCurrentQuestion,
    #[error("answer for {received} but current question is {expected}")]
    QuestionMismatch { expected: String, received: String },
    #[error("{chosen:?} is not an option of question {question_id}")]
    UnknownOption { question_id: String, chosen: String },
    #[error("unknown review {0}")]
    UnknownReview(String),
}

impl ProgressionError {
    /// Friendly message for learners.
    pub fn user_message(&self) -> &'static str {
        match self {
            ProgressionError::NotStarted => "Bài kiểm tra chưa được bắt đầu.",
            ProgressionError::AlreadyStarted => "Bài kiểm tra đã được bắt đầu rồi.",
            ProgressionError::Finished => "Bài kiểm tra đã kết thúc. Hãy xem kết quả của em nhé!",
            ProgressionError::NotFinished => "Em chưa hoàn thành bài kiểm tra.",
            ProgressionError::AwaitingSupport => {
                "Hãy xem phần hỗ trợ của trợ lý AI trước khi làm tiếp."
            }
            ProgressionError::NotInSupport => "Hiện không có phần hỗ trợ AI nào đang mở.",
            ProgressionError::NoCurrentQuestion => "Không có câu hỏi nào đang chờ trả lời.",
            ProgressionError::QuestionMismatch { .. } => {
                "Câu hỏi này đã được trả lời hoặc không còn hiệu lực."
            }
            ProgressionError::UnknownOption { .. } => "Đáp án không hợp lệ cho câu hỏi này.",
            ProgressionError::UnknownReview(_) => "Không tìm thấy phần hỗ trợ này.",
        }
    }
}

/// Result of applying one event.
#[derive(Debug, Clone)]
pub struct Step {
    pub session: TestSession,
    pub feedback: Option<AnswerFeedback>,
    pub verdict: Option<BatchVerdict>,
    pub transition: Option<Transition>,
    /// The event repeated an already applied continue; nothing changed.
    pub replayed: bool,
}

impl Step {
    fn new(session: TestSession) -> Self {
        Self {
            session,
            feedback: None,
            verdict: None,
            transition: None,
            replayed: false,
        }
    }

    pub fn navigation(&self) -> Navigation {
        Navigation::for_phase(&self.session.phase)
    }
}

/// Owns the progression rules. `apply` is a pure `(state, event) -> state`
/// function; the bank and support catalog are read-only inputs.
#[derive(Debug, Clone)]
pub struct Controller {
    settings: AdaptiveSettings,
    bank: Arc<QuestionBank>,
    catalog: Arc<SupportCatalog>,
}

impl Controller {
    pub fn new(
        settings: AdaptiveSettings,
        bank: Arc<QuestionBank>,
        catalog: Arc<SupportCatalog>,
    ) -> Self {
        Self {
            settings,
            bank,
            catalog,
        }
    }

    pub fn settings(&self) -> &AdaptiveSettings {
        &self.settings
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn catalog(&self) -> &SupportCatalog {
        &self.catalog
    }

    pub fn apply(&self, session: &TestSession, event: Event) -> Result<Step, ProgressionError> {
        let next = session.clone();
        match event {
            Event::Start { at } => self.start(next, at),
            Event::Answer {
                question_id,
                chosen,
                time_spent_ms,
                at,
            } => self.answer(next, &question_id, &chosen, time_spent_ms, at),
            Event::ContinueAfterSupport {
                review_id,
                policy,
                at,
            } => self.continue_after_support(next, &review_id, policy, at),
        }
    }

    fn start(&self, mut s: TestSession, at: DateTime<Utc>) -> Result<Step, ProgressionError> {
        match s.phase {
            Phase::Intro => {}
            Phase::Results => return Err(ProgressionError::Finished),
            _ => return Err(ProgressionError::AlreadyStarted),
        }

        s.started_at = Some(at);
        s.support_rounds = 0;
        s.resumed_from = None;

        let transition = match self.open_tier(&mut s, Some(Difficulty::Recognition), at) {
            Some(_) => None,
            None => Some(Transition::Finished {
                accuracy: accuracy(&s.answers),
            }),
        };

        let mut step = Step::new(s);
        step.transition = transition;
        Ok(step)
    }

    fn answer(
        &self,
        mut s: TestSession,
        question_id: &str,
        chosen: &str,
        time_spent_ms: u64,
        at: DateTime<Utc>,
    ) -> Result<Step, ProgressionError> {
        match s.phase {
            Phase::Testing => {}
            Phase::Intro => return Err(ProgressionError::NotStarted),
            Phase::AiSupport(_) => return Err(ProgressionError::AwaitingSupport),
            Phase::Results => return Err(ProgressionError::Finished),
        }

        let question = s
            .batch
            .current()
            .cloned()
            .ok_or(ProgressionError::NoCurrentQuestion)?;

        if question.id != question_id {
            return Err(ProgressionError::QuestionMismatch {
                expected: question.id,
                received: question_id.to_string(),
            });
        }
        if !question.has_option(chosen) {
            return Err(ProgressionError::UnknownOption {
                question_id: question.id,
                chosen: chosen.to_string(),
            });
        }

        let correct = question.is_correct(chosen);
        s.answers.push(AnswerRecord {
            question_id: question.id.clone(),
            lesson: question.lesson,
            difficulty: s.tier,
            batch_kind: s.batch.kind,
            chosen: chosen.trim().to_string(),
            correct,
            time_spent_ms,
            answered_at: at,
        });
        if !correct {
            s.failed_lessons.insert(question.lesson);
        }
        s.batch.index += 1;
        s.resumed_from = None;

        let batch_complete = s.batch.is_exhausted();
        let (verdict, transition) = if batch_complete {
            let (verdict, transition) = self.complete_batch(&mut s, at);
            (Some(verdict), Some(transition))
        } else {
            (None, None)
        };

        let mut step = Step::new(s);
        step.feedback = Some(AnswerFeedback {
            question_id: question.id,
            chosen: chosen.trim().to_string(),
            correct,
            correct_answer: question.correct_answer,
            explanation: question.explanation,
            batch_complete,
        });
        step.verdict = verdict;
        step.transition = transition;
        Ok(step)
    }

    fn complete_batch(&self, s: &mut TestSession, at: DateTime<Utc>) -> (BatchVerdict, Transition) {
        let size = match s.batch.kind {
            BatchKind::Supplementary => self.settings.supplementary_size,
            BatchKind::Primary | BatchKind::Retry => self.settings.batch_size,
        };
        let verdict = grade_batch(&s.answers, s.batch.len(), self.settings.pass_threshold, size);

        tracing::debug!(
            "Batch graded: session={}, tier={}, kind={:?}, correct={}/{}, required={}",
            s.id,
            s.tier,
            s.batch.kind,
            verdict.correct,
            verdict.total,
            verdict.required
        );

        let transition = match (s.batch.kind, verdict.passed) {
            (BatchKind::Primary, true) | (BatchKind::Retry, true) => self.advance(s, at),
            (BatchKind::Primary, false) => {
                let remediation = select_supplementary_ordered(
                    self.bank.supplementary_pool(),
                    s.tier,
                    &s.failed_lessons,
                    self.settings.supplementary_size,
                    self.settings.order,
                    salt(&s.id, s.tier, 1),
                );
                if remediation.is_empty() {
                    self.enter_support(s, SupportReason::NoRemediation, at)
                } else {
                    let size = remediation.len();
                    s.batch = Batch::new(BatchKind::Supplementary, remediation);
                    Transition::SupplementaryStarted {
                        lessons: s.failed_lessons.iter().copied().collect(),
                        size,
                    }
                }
            }
            (BatchKind::Supplementary, _) => {
                self.enter_support(s, SupportReason::SupplementaryExhausted, at)
            }
            (BatchKind::Retry, false) => self.enter_support(s, SupportReason::RetryFailed, at),
        };

        (verdict, transition)
    }

    fn continue_after_support(
        &self,
        mut s: TestSession,
        review_id: &str,
        policy: RetryPolicy,
        at: DateTime<Utc>,
    ) -> Result<Step, ProgressionError> {
        let replay = !s.ai_support_required() && s.resumed_from.as_deref() == Some(review_id);
        if replay {
            let mut step = Step::new(s);
            step.replayed = true;
            return Ok(step);
        }

        match &s.phase {
            Phase::AiSupport(round) if round.id == review_id => {}
            Phase::AiSupport(_) => {
                return Err(ProgressionError::UnknownReview(review_id.to_string()))
            }
            Phase::Intro => return Err(ProgressionError::NotStarted),
            Phase::Testing => return Err(ProgressionError::NotInSupport),
            Phase::Results => return Err(ProgressionError::Finished),
        }

        let missed = s.missed_in_batch();
        let retry = match policy {
            RetryPolicy::MissedQuestions => missed,
            RetryPolicy::Supplementary => {
                let fresh = select_supplementary_ordered(
                    self.bank.supplementary_pool(),
                    s.tier,
                    &s.failed_lessons,
                    self.settings.supplementary_size,
                    self.settings.order,
                    salt(&s.id, s.tier, 2 + u64::from(s.support_rounds)),
                );
                if fresh.is_empty() {
                    missed
                } else {
                    fresh
                }
            }
        };

        s.resumed_from = Some(review_id.to_string());

        let transition = if retry.is_empty() {
            tracing::debug!(
                "Nothing to retry after support round {} for session {}, passing through",
                review_id,
                s.id
            );
            self.advance(&mut s, at)
        } else {
            let size = retry.len();
            s.batch = Batch::new(BatchKind::Retry, retry);
            s.phase = Phase::Testing;
            Transition::RetryStarted { policy, size }
        };

        let mut step = Step::new(s);
        step.transition = Some(transition);
        Ok(step)
    }

    fn advance(&self, s: &mut TestSession, at: DateTime<Utc>) -> Transition {
        let from = s.tier;
        match self.open_tier(s, from.next(), at) {
            Some(to) => Transition::TierAdvanced { from, to },
            None => Transition::Finished {
                accuracy: accuracy(&s.answers),
            },
        }
    }

    /// Moves to the first tier at or after `candidate` that has questions;
    /// finishes the session when none is left. Returns the opened tier.
    fn open_tier(
        &self,
        s: &mut TestSession,
        mut candidate: Option<Difficulty>,
        at: DateTime<Utc>,
    ) -> Option<Difficulty> {
        s.failed_lessons.clear();

        while let Some(tier) = candidate {
            let questions = select_batch_ordered(
                self.bank.primary(),
                tier,
                self.settings.batch_size,
                self.settings.order,
                salt(&s.id, tier, 0),
            );
            if !questions.is_empty() {
                s.tier = tier;
                s.batch = Batch::new(BatchKind::Primary, questions);
                s.phase = Phase::Testing;
                return Some(tier);
            }
            tracing::warn!("No {} questions in bank, skipping tier", tier);
            candidate = tier.next();
        }

        s.phase = Phase::Results;
        s.ended_at = Some(at);
        None
    }

    fn enter_support(
        &self,
        s: &mut TestSession,
        reason: SupportReason,
        at: DateTime<Utc>,
    ) -> Transition {
        // Topic of the question that was in progress when the batch failed.
        let topic = s
            .batch
            .questions
            .last()
            .map(|q| q.topic.clone())
            .unwrap_or_default();

        s.support_rounds += 1;
        let review_id = format!("review-{}", s.support_rounds);

        s.phase = Phase::AiSupport(SupportRound {
            id: review_id.clone(),
            topic: topic.clone(),
            reason,
            content: self.catalog.lookup(&topic),
            opened_at: at,
        });

        Transition::AiSupportEntered {
            review_id,
            topic,
            reason,
        }
    }
}

/// Stable per-session, per-tier salt for seeded selection (FNV-1a).
fn salt(session_id: &str, tier: Difficulty, round: u64) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in session_id.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash ^ ((tier as u64) << 32) ^ round
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Question, SupportContent};
    use std::collections::HashMap;

    fn q(id: &str, lesson: u8, difficulty: Difficulty, topic: &str) -> Question {
        Question {
            id: id.to_string(),
            lesson,
            difficulty,
            text: format!("Câu hỏi {}", id),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answer: "A".into(),
            explanation: format!("Giải thích {}", id),
            topic: topic.to_string(),
            subtopic: String::new(),
        }
    }

    fn tier_questions(prefix: &str, difficulty: Difficulty) -> Vec<Question> {
        vec![
            q(&format!("{}1", prefix), 1, difficulty, "Số tự nhiên"),
            q(&format!("{}2", prefix), 1, difficulty, "Số tự nhiên"),
            q(&format!("{}3", prefix), 2, difficulty, "Phân số"),
            q(&format!("{}4", prefix), 2, difficulty, "Phân số"),
            q(&format!("{}5", prefix), 3, difficulty, "Số thập phân"),
        ]
    }

    fn primary() -> Vec<Question> {
        let mut all = tier_questions("r", Difficulty::Recognition);
        all.extend(tier_questions("u", Difficulty::Understanding));
        all.extend(tier_questions("a", Difficulty::Application));
        all
    }

    fn supplementary() -> Vec<Question> {
        vec![
            q("s1", 1, Difficulty::Recognition, "Số tự nhiên"),
            q("s2", 2, Difficulty::Recognition, "Phân số"),
            q("s3", 4, Difficulty::Recognition, "Hình học"),
        ]
    }

    fn controller_with(bank: QuestionBank) -> Controller {
        let mut topics = HashMap::new();
        topics.insert(
            "Phân số".to_string(),
            SupportContent {
                theory: "Lý thuyết phân số".into(),
                example: "Ví dụ phân số".into(),
            },
        );
        Controller::new(
            AdaptiveSettings::default(),
            Arc::new(bank),
            Arc::new(SupportCatalog::new(topics)),
        )
    }

    fn controller() -> Controller {
        controller_with(QuestionBank::new(primary(), supplementary()))
    }

    fn started(c: &Controller) -> TestSession {
        let s = TestSession::new("s-1".into(), "learner-1".into(), Utc::now());
        c.apply(&s, Event::Start { at: Utc::now() }).unwrap().session
    }

    fn answer(c: &Controller, s: &TestSession, correct: bool) -> Step {
        let current = s.batch.current().expect("current question");
        let chosen = if correct { "A" } else { "B" };
        c.apply(
            s,
            Event::Answer {
                question_id: current.id.clone(),
                chosen: chosen.into(),
                time_spent_ms: 1500,
                at: Utc::now(),
            },
        )
        .unwrap()
    }

    fn answer_all(c: &Controller, mut s: TestSession, pattern: &[bool]) -> Step {
        let mut last = None;
        for correct in pattern {
            let step = answer(c, &s, *correct);
            s = step.session.clone();
            last = Some(step);
        }
        last.expect("at least one answer")
    }

    fn cont(c: &Controller, s: &TestSession, policy: RetryPolicy) -> Step {
        let review_id = s.support_round().expect("in support").id.clone();
        c.apply(
            s,
            Event::ContinueAfterSupport {
                review_id,
                policy,
                at: Utc::now(),
            },
        )
        .unwrap()
    }

    #[test]
    fn start_selects_recognition_batch() {
        let c = controller();
        let s = started(&c);
        assert_eq!(s.phase, Phase::Testing);
        assert_eq!(s.tier, Difficulty::Recognition);
        assert_eq!(s.batch.kind, BatchKind::Primary);
        assert_eq!(s.batch.len(), 5);
        assert_eq!(s.batch.index, 0);
        assert!(s.failed_lessons.is_empty());
        assert!(s.started_at.is_some());
    }

    #[test]
    fn four_of_five_advances_and_resets_failed_lessons() {
        let c = controller();
        let s = started(&c);
        // The wrong answer is r1, lesson 1.
        let step = answer_all(&c, s, &[false, true, true, true, true]);

        assert_eq!(
            step.transition,
            Some(Transition::TierAdvanced {
                from: Difficulty::Recognition,
                to: Difficulty::Understanding
            })
        );
        assert!(step.verdict.unwrap().passed);
        assert_eq!(step.session.tier, Difficulty::Understanding);
        assert!(step.session.failed_lessons.is_empty());
        assert_eq!(step.session.batch.index, 0);
    }

    #[test]
    fn failed_lessons_use_set_semantics() {
        let c = controller();
        let s = started(&c);
        let step = answer_all(&c, s, &[false, false]);
        assert_eq!(step.session.failed_lessons.len(), 1);
        assert!(step.session.failed_lessons.contains(&1));
    }

    #[test]
    fn failing_primary_enters_supplementary_from_failed_lessons() {
        let c = controller();
        let s = started(&c);
        // Wrong on r1 (lesson 1), r3 and r4 (lesson 2).
        let step = answer_all(&c, s, &[false, true, false, false, true]);

        assert_eq!(
            step.transition,
            Some(Transition::SupplementaryStarted {
                lessons: vec![1, 2],
                size: 2
            })
        );
        let session = step.session;
        assert_eq!(session.batch.kind, BatchKind::Supplementary);
        let ids: Vec<_> = session.batch.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        // Failed lessons survive the switch to a supplementary batch.
        assert_eq!(session.failed_lessons.iter().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(session.tier, Difficulty::Recognition);
    }

    #[test]
    fn failing_primary_without_remediation_enters_ai_support() {
        let c = controller_with(QuestionBank::new(
            primary(),
            vec![q("s9", 5, Difficulty::Recognition, "Hình học")],
        ));
        let s = started(&c);
        let step = answer_all(&c, s, &[false, true, false, false, true]);

        match step.transition {
            Some(Transition::AiSupportEntered { ref topic, reason, .. }) => {
                // r5 was the question in progress when the failure was tallied.
                assert_eq!(topic, "Số thập phân");
                assert_eq!(reason, SupportReason::NoRemediation);
            }
            ref other => panic!("unexpected transition {:?}", other),
        }
        assert!(step.session.ai_support_required());
        assert_eq!(step.navigation().view().target, "ai_support");
    }

    #[test]
    fn supplementary_batch_always_escalates_to_ai_support() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        // Pass the supplementary batch; support is still entered.
        let step = answer_all(&c, s, &[true, true]);

        let round = step.session.support_round().unwrap();
        assert_eq!(round.reason, SupportReason::SupplementaryExhausted);
        assert_eq!(round.topic, "Phân số");
        assert_eq!(round.content.theory, "Lý thuyết phân số");
        assert_eq!(round.id, "review-1");
    }

    #[test]
    fn continue_retries_exactly_the_missed_questions() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[false, true]).session;

        let step = cont(&c, &s, RetryPolicy::MissedQuestions);
        assert_eq!(
            step.transition,
            Some(Transition::RetryStarted {
                policy: RetryPolicy::MissedQuestions,
                size: 1
            })
        );
        assert_eq!(step.session.phase, Phase::Testing);
        assert_eq!(step.session.batch.kind, BatchKind::Retry);
        assert_eq!(step.session.batch.questions[0].id, "s1");
    }

    #[test]
    fn continue_is_idempotent_without_intervening_answer() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[false, false]).session;
        let review_id = s.support_round().unwrap().id.clone();

        let first = cont(&c, &s, RetryPolicy::MissedQuestions);
        let again = c
            .apply(
                &first.session,
                Event::ContinueAfterSupport {
                    review_id,
                    policy: RetryPolicy::MissedQuestions,
                    at: Utc::now(),
                },
            )
            .unwrap();

        assert!(again.replayed);
        assert_eq!(again.session.batch, first.session.batch);
    }

    #[test]
    fn retry_pass_advances_tier() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[false, false]).session;
        let s = cont(&c, &s, RetryPolicy::MissedQuestions).session;
        let step = answer_all(&c, s, &[true, true]);

        assert_eq!(
            step.transition,
            Some(Transition::TierAdvanced {
                from: Difficulty::Recognition,
                to: Difficulty::Understanding
            })
        );
        assert!(step.session.resumed_from.is_none());
    }

    #[test]
    fn retry_failure_opens_a_new_support_round() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[false, false]).session;
        let s = cont(&c, &s, RetryPolicy::MissedQuestions).session;
        let step = answer_all(&c, s, &[false, true]);

        let round = step.session.support_round().unwrap();
        assert_eq!(round.reason, SupportReason::RetryFailed);
        assert_eq!(round.id, "review-2");
    }

    #[test]
    fn empty_retry_set_passes_through_to_next_tier() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[true, true]).session;

        let step = cont(&c, &s, RetryPolicy::MissedQuestions);
        assert_eq!(
            step.transition,
            Some(Transition::TierAdvanced {
                from: Difficulty::Recognition,
                to: Difficulty::Understanding
            })
        );
    }

    #[test]
    fn supplementary_policy_draws_fresh_remediation() {
        let c = controller();
        let s = started(&c);
        let s = answer_all(&c, s, &[false, true, false, false, true]).session;
        let s = answer_all(&c, s, &[true, false]).session;

        let step = cont(&c, &s, RetryPolicy::Supplementary);
        let ids: Vec<_> = step.session.batch.questions.iter().map(|q| q.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert_eq!(step.session.batch.kind, BatchKind::Retry);
    }

    #[test]
    fn all_correct_run_finishes_with_full_accuracy() {
        let c = controller();
        let mut s = started(&c);
        let mut last = None;
        for _ in Difficulty::all() {
            let step = answer_all(&c, s.clone(), &[true; 5]);
            s = step.session.clone();
            last = Some(step);
        }
        let step = last.unwrap();

        assert_eq!(step.transition, Some(Transition::Finished { accuracy: 100.0 }));
        assert_eq!(step.session.phase, Phase::Results);
        assert!(step.session.ended_at.is_some());
        assert_eq!(step.session.support_rounds, 0);
        assert_eq!(step.session.answers.len(), 15);
        assert_eq!(step.navigation(), Navigation::Results);
    }

    #[test]
    fn tiers_without_questions_are_skipped() {
        let mut bank = tier_questions("r", Difficulty::Recognition);
        bank.extend(tier_questions("a", Difficulty::Application));
        let c = controller_with(QuestionBank::new(bank, Vec::new()));
        let s = started(&c);
        let step = answer_all(&c, s, &[true; 5]);

        assert_eq!(
            step.transition,
            Some(Transition::TierAdvanced {
                from: Difficulty::Recognition,
                to: Difficulty::Application
            })
        );
    }

    #[test]
    fn invalid_events_are_rejected() {
        let c = controller();
        let fresh = TestSession::new("s-2".into(), "learner".into(), Utc::now());
        let err = c
            .apply(
                &fresh,
                Event::Answer {
                    question_id: "r1".into(),
                    chosen: "A".into(),
                    time_spent_ms: 0,
                    at: Utc::now(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ProgressionError::NotStarted);

        let s = started(&c);
        let err = c.apply(&s, Event::Start { at: Utc::now() }).unwrap_err();
        assert_eq!(err, ProgressionError::AlreadyStarted);

        let err = c
            .apply(
                &s,
                Event::Answer {
                    question_id: "r2".into(),
                    chosen: "A".into(),
                    time_spent_ms: 0,
                    at: Utc::now(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ProgressionError::QuestionMismatch { .. }));

        let err = c
            .apply(
                &s,
                Event::Answer {
                    question_id: "r1".into(),
                    chosen: "Z".into(),
                    time_spent_ms: 0,
                    at: Utc::now(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, ProgressionError::UnknownOption { .. }));

        let err = c
            .apply(
                &s,
                Event::ContinueAfterSupport {
                    review_id: "review-1".into(),
                    policy: RetryPolicy::MissedQuestions,
                    at: Utc::now(),
                },
            )
            .unwrap_err();
        assert_eq!(err, ProgressionError::NotInSupport);
    }

    #[test]
    fn navigation_routes_encode_topic() {
        let nav = Navigation::AiSupport {
            review_id: "review-1".into(),
            topic: "Phân số".into(),
        };
        assert!(nav.route().starts_with("/adaptive-test/ai-support?topic=Ph%C3%A2n%20s%E1%BB%91"));
        assert_eq!(Navigation::Results.view().route, "/adaptive-test/results");
    }

    #[test]
    fn settings_validation() {
        assert!(AdaptiveSettings::default().validate().is_ok());
        let bad = AdaptiveSettings {
            pass_threshold: 6,
            ..AdaptiveSettings::default()
        };
        assert!(bad.validate().is_err());
    }
}
