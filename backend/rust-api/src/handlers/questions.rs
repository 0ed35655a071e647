use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::MathQuestion;
use crate::services::AppState;

#[derive(Debug, Deserialize)]
pub struct QuestionsQuery {
    pub topic: Option<String>,
}

/// Bank entries for a topic (all primary questions without one). Correct
/// answers are included: this feed is for client-side question providers.
pub async fn list_math_questions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QuestionsQuery>,
) -> Json<Vec<MathQuestion>> {
    let topic = query.topic.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let questions: Vec<MathQuestion> = state
        .bank
        .by_topic(topic)
        .into_iter()
        .map(MathQuestion::from)
        .collect();

    tracing::debug!(
        "Serving {} math questions for topic={:?}",
        questions.len(),
        topic
    );
    Json(questions)
}
