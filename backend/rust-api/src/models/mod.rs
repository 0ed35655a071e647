use serde::{Deserialize, Serialize};
use validator::Validate;

pub mod answer;
pub mod chat;
pub mod question;
pub mod review;
pub mod session;

pub use answer::{AnswerFeedback, SubmitAnswerRequest};
pub use chat::{SupportReply, SupportSource};
pub use question::{Difficulty, MathQuestion, Question, QuestionView, RawQuestion};
pub use review::ReviewPayload;
pub use session::{
    AnswerRecord, Batch, BatchBundle, BatchKind, Phase, SessionSummary, SessionView,
    SupportContent, SupportReason, SupportRound, TestSession, TierSummary,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
}

/// Where the hosting UI should route after a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationView {
    pub target: String,
    pub route: String,
}

/// Common response body of the session API: `{success, session?, bundle?, ...}`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SessionEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<BatchBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_bundle: Option<BatchBundle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnswerFeedback>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<ReviewPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SessionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation: Option<NavigationView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SessionEnvelope {
    pub fn ok(session: &TestSession) -> Self {
        Self {
            success: true,
            session: Some(SessionView::from(session)),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::default()
        }
    }
}
