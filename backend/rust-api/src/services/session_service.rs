use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::adaptive::scoring::summarize;
use crate::adaptive::{Controller, Event, ProgressionError, RetryPolicy, Step, Transition};
use crate::errors::ApiError;
use crate::metrics::{ANSWERS_SUBMITTED_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL, TRANSITIONS_TOTAL};
use crate::models::{
    Phase, QuestionView, ReviewPayload, SessionSummary, SubmitAnswerRequest, SupportReply,
    TestSession,
};

use super::ai_support_service::AiSupportService;
use super::results_service::ResultsService;
use super::session_store::SessionStore;

/// Hosts the progression engine server-side: every call loads the session,
/// applies one event and saves it back with a version check.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    controller: Arc<Controller>,
    ai_support: Arc<AiSupportService>,
    results: ResultsService,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        controller: Arc<Controller>,
        ai_support: Arc<AiSupportService>,
        results: ResultsService,
    ) -> Self {
        Self {
            store,
            controller,
            ai_support,
            results,
        }
    }

    pub async fn create_session(&self, user_id: &str) -> Result<TestSession, ApiError> {
        let session = TestSession::new(Uuid::new_v4().to_string(), user_id.to_string(), Utc::now());
        self.store.insert(&session).await?;

        SESSIONS_TOTAL.with_label_values(&["created"]).inc();
        tracing::info!(
            "Created session: id={}, user_id={}, backend={}",
            session.id,
            session.user_id,
            self.store.backend()
        );
        Ok(session)
    }

    pub async fn get_session(&self, session_id: &str) -> Result<TestSession, ApiError> {
        Ok(self.store.get(session_id).await?)
    }

    pub async fn start_session(&self, session_id: &str) -> Result<Step, ApiError> {
        let step = self
            .apply(session_id, Event::Start { at: Utc::now() })
            .await?;

        SESSIONS_TOTAL.with_label_values(&["started"]).inc();
        SESSIONS_ACTIVE.inc();
        if let Some(Transition::Finished { .. }) = step.transition {
            // Nothing in the bank: the session went straight to results.
            self.finish(&step.session);
        }

        tracing::info!(
            "Session started: id={}, tier={}, batch_size={}",
            session_id,
            step.session.tier,
            step.session.batch.len()
        );
        Ok(step)
    }

    pub async fn submit_answer(
        &self,
        session_id: &str,
        req: SubmitAnswerRequest,
    ) -> Result<Step, ApiError> {
        let event = Event::Answer {
            question_id: req.question_id,
            chosen: req.answer,
            time_spent_ms: req.time_spent_ms,
            at: Utc::now(),
        };
        let step = self.apply(session_id, event).await?;

        if let Some(record) = step.session.answers.last() {
            ANSWERS_SUBMITTED_TOTAL
                .with_label_values(&[
                    record.difficulty.as_str(),
                    if record.correct { "true" } else { "false" },
                ])
                .inc();
            tracing::debug!(
                "Answer recorded: session={}, question={}, correct={}",
                session_id,
                record.question_id,
                record.correct
            );
        }

        if let Some(Transition::Finished { .. }) = step.transition {
            self.finish(&step.session);
        }
        Ok(step)
    }

    /// AI support payload for the open round. Reading it never changes the
    /// session.
    pub async fn open_review(
        &self,
        session_id: &str,
    ) -> Result<(TestSession, ReviewPayload), ApiError> {
        let session = self.store.get(session_id).await?;
        let round = match &session.phase {
            Phase::AiSupport(round) => round,
            Phase::Intro => return Err(ProgressionError::NotStarted.into()),
            Phase::Testing => return Err(ProgressionError::NotInSupport.into()),
            Phase::Results => return Err(ProgressionError::Finished.into()),
        };

        let missed = session.missed_in_batch();
        let context = (!missed.is_empty()).then(|| {
            missed
                .iter()
                .map(|q| q.text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        });
        let ai = self.ai_support.request_support(&round.topic, context).await;

        tracing::info!(
            "Review opened: session={}, review={}, topic={}, ai_source={}",
            session_id,
            round.id,
            round.topic,
            ai.source.as_str()
        );

        let payload = review_payload(&session, Some(ai))
            .ok_or(ApiError::Progression(ProgressionError::NotInSupport))?;
        Ok((session, payload))
    }

    pub async fn continue_review(
        &self,
        session_id: &str,
        review_id: &str,
        policy: RetryPolicy,
    ) -> Result<Step, ApiError> {
        let event = Event::ContinueAfterSupport {
            review_id: review_id.to_string(),
            policy,
            at: Utc::now(),
        };
        let step = self.apply(session_id, event).await?;

        if step.replayed {
            tracing::info!(
                "Continue replayed: session={}, review={}",
                session_id,
                review_id
            );
        }
        if let Some(Transition::Finished { .. }) = step.transition {
            self.finish(&step.session);
        }
        Ok(step)
    }

    pub async fn summary(&self, session_id: &str) -> Result<SessionSummary, ApiError> {
        let session = self.store.get(session_id).await?;
        match session.phase {
            Phase::Results => Ok(summarize(&session)),
            _ => Err(ProgressionError::NotFinished.into()),
        }
    }

    async fn apply(&self, session_id: &str, event: Event) -> Result<Step, ApiError> {
        let loaded = self.store.get(session_id).await?;
        let mut step = self.controller.apply(&loaded, event)?;
        if step.replayed {
            return Ok(step);
        }

        step.session = self.store.save(&step.session, loaded.version).await?;

        if let Some(transition) = &step.transition {
            TRANSITIONS_TOTAL
                .with_label_values(&[transition.name()])
                .inc();
            tracing::info!(
                "Transition: session={}, {:?}, phase={}",
                session_id,
                transition,
                step.session.phase.name()
            );
        }
        Ok(step)
    }

    fn finish(&self, session: &TestSession) {
        SESSIONS_ACTIVE.dec();
        SESSIONS_TOTAL.with_label_values(&["completed"]).inc();

        let summary = summarize(session);
        tracing::info!(
            "Session completed: id={}, accuracy={:.1}%, support_rounds={}",
            summary.session_id,
            summary.accuracy,
            summary.ai_support_rounds
        );
        self.results.archive(summary);
    }
}

/// Review payload for the round the session is in, `None` outside AI support.
pub fn review_payload(session: &TestSession, ai: Option<SupportReply>) -> Option<ReviewPayload> {
    let round = session.support_round()?;
    Some(ReviewPayload {
        id: round.id.clone(),
        topic: round.topic.clone(),
        reason: round.reason,
        theory: round.content.theory.clone(),
        example: round.content.example.clone(),
        missed_questions: session
            .missed_in_batch()
            .iter()
            .map(QuestionView::from)
            .collect(),
        ai,
    })
}
