use serde::{Deserialize, Serialize};

use super::chat::SupportReply;
use super::question::QuestionView;
use super::session::SupportReason;

/// Payload of the AI support screen for one open support round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewPayload {
    pub id: String,
    pub topic: String,
    pub reason: SupportReason,
    pub theory: String,
    pub example: String,
    pub missed_questions: Vec<QuestionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<SupportReply>,
}
