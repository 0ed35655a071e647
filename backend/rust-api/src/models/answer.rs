use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    #[validate(length(min = 1, max = 128))]
    pub question_id: String,
    #[validate(length(min = 1, max = 1024))]
    pub answer: String,
    #[serde(default)]
    pub time_spent_ms: u64,
}

/// Feedback shown right after an answer: the correct option and why.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question_id: String,
    pub chosen: String,
    pub correct: bool,
    pub correct_answer: String,
    pub explanation: String,
    pub batch_complete: bool,
}
