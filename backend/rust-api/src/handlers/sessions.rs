use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use validator::Validate;

use crate::adaptive::scoring::summarize;
use crate::adaptive::{Navigation, RetryPolicy, Step, Transition};
use crate::errors::ApiError;
use crate::extractors::AppJson;
use crate::models::{
    BatchBundle, CreateSessionRequest, Phase, SessionEnvelope, SubmitAnswerRequest, TestSession,
};
use crate::services::{session_service::review_payload, AppState};

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    tracing::info!("Creating session for user_id={}", req.user_id);

    let session = state.sessions.create_session(req.user_id.trim()).await?;
    Ok((StatusCode::CREATED, Json(snapshot(&session))))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let session = state.sessions.get_session(&session_id).await?;
    Ok(Json(snapshot(&session)))
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    tracing::info!("Starting session: {}", session_id);

    let step = state.sessions.start_session(&session_id).await?;
    let mut envelope = envelope(&step);
    if step.session.phase == Phase::Testing {
        envelope.bundle = Some(BatchBundle::of(&step.session));
    }
    Ok(Json(envelope))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    req.validate()?;
    tracing::info!(
        "Submitting answer for session: {}, question: {}",
        session_id,
        req.question_id
    );

    let step = state.sessions.submit_answer(&session_id, req).await?;
    let mut envelope = envelope(&step);
    envelope.result = step.feedback.clone();
    match &step.transition {
        Some(t) if t.starts_batch() => {
            envelope.next_bundle = Some(BatchBundle::of(&step.session));
        }
        Some(Transition::AiSupportEntered { .. }) => {
            envelope.review = review_payload(&step.session, None);
        }
        _ => {}
    }
    Ok(Json(envelope))
}

pub async fn open_review(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let (session, review) = state.sessions.open_review(&session_id).await?;

    let mut envelope = snapshot(&session);
    envelope.review = Some(review);
    Ok(Json(envelope))
}

pub async fn continue_fail(
    State(state): State<Arc<AppState>>,
    Path((session_id, review_id)): Path<(String, String)>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    continue_review(&state, &session_id, &review_id, RetryPolicy::MissedQuestions).await
}

pub async fn continue_supplementary(
    State(state): State<Arc<AppState>>,
    Path((session_id, review_id)): Path<(String, String)>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    continue_review(&state, &session_id, &review_id, RetryPolicy::Supplementary).await
}

async fn continue_review(
    state: &AppState,
    session_id: &str,
    review_id: &str,
    policy: RetryPolicy,
) -> Result<Json<SessionEnvelope>, ApiError> {
    tracing::info!(
        "Continuing after review {} for session {} ({:?})",
        review_id,
        session_id,
        policy
    );

    let step = state
        .sessions
        .continue_review(session_id, review_id, policy)
        .await?;
    let mut envelope = envelope(&step);
    if step.session.phase == Phase::Testing {
        envelope.next_bundle = Some(BatchBundle::of(&step.session));
    }
    Ok(Json(envelope))
}

pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionEnvelope>, ApiError> {
    let summary = state.sessions.summary(&session_id).await?;
    Ok(Json(SessionEnvelope {
        success: true,
        summary: Some(summary),
        navigation: Some(Navigation::Results.view()),
        ..SessionEnvelope::default()
    }))
}

fn snapshot(session: &TestSession) -> SessionEnvelope {
    let mut envelope = SessionEnvelope::ok(session);
    envelope.navigation = Some(Navigation::for_phase(&session.phase).view());
    envelope
}

fn envelope(step: &Step) -> SessionEnvelope {
    let mut envelope = snapshot(&step.session);
    if let Some(Transition::Finished { .. }) = step.transition {
        envelope.summary = Some(summarize(&step.session));
    }
    envelope
}
