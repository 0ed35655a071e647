use serde::{Deserialize, Serialize};

/// Body of `POST /api/chat` on the AI support gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallToAction {
    pub text: String,
    pub href: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<CallToAction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SupportSource {
    Gateway,
    Cache,
    Pending,
    Fallback,
}

impl SupportSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SupportSource::Gateway => "gateway",
            SupportSource::Cache => "cache",
            SupportSource::Pending => "pending",
            SupportSource::Fallback => "fallback",
        }
    }
}

/// What the AI support gateway produced for one topic. Never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cta: Option<CallToAction>,
    pub source: SupportSource,
}
