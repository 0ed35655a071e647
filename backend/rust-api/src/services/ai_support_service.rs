use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::AiSupportConfig;
use crate::metrics::AI_SUPPORT_REQUESTS_TOTAL;
use crate::models::chat::{ChatRequest, ChatResponse, SupportReply, SupportSource};

pub const FALLBACK_RESPONSE: &str =
    "Xin lỗi, trợ lý AI hiện chưa thể trả lời. Em hãy đọc phần lý thuyết và ví dụ bên dưới, rồi thử lại sau nhé!";
pub const PENDING_RESPONSE: &str =
    "Trợ lý AI đang chuẩn bị phần giải thích cho chủ đề này, em vui lòng chờ trong giây lát...";

/// Client for the external AI support gateway (`POST /api/chat`).
///
/// Calls are never retried and never fail: every error path degrades to a
/// static Vietnamese message. Only one request per topic is in flight at a
/// time; concurrent callers get a "pending" reply instead of a second call.
pub struct AiSupportService {
    http_client: reqwest::Client,
    base_url: String,
    enabled: bool,
    cache_ttl: Duration,
    in_flight: Arc<Mutex<HashSet<String>>>,
    cache: Mutex<HashMap<String, (ChatResponse, Instant)>>,
}

/// Releases the topic slot when the gateway call finishes, however it ends.
struct InFlightGuard {
    topic: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut topics) = self.in_flight.lock() {
            topics.remove(&self.topic);
        }
    }
}

impl AiSupportService {
    pub fn new(config: &AiSupportConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build AI support HTTP client")?;

        Ok(Self {
            http_client,
            base_url: config.url.trim_end_matches('/').to_string(),
            enabled: config.enabled,
            cache_ttl: Duration::from_secs(config.cache_ttl_seconds),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub async fn request_support(&self, topic: &str, context: Option<String>) -> SupportReply {
        let reply = self.resolve(topic, context).await;
        AI_SUPPORT_REQUESTS_TOTAL
            .with_label_values(&[reply.source.as_str()])
            .inc();
        reply
    }

    async fn resolve(&self, topic: &str, context: Option<String>) -> SupportReply {
        if !self.enabled {
            tracing::debug!("AI support disabled; using fallback for topic={}", topic);
            return Self::fallback();
        }

        if let Some(cached) = self.cached(topic) {
            tracing::debug!("AI support served from cache for topic={}", topic);
            return SupportReply {
                response: cached.response,
                cta: cached.cta,
                source: SupportSource::Cache,
            };
        }

        let Some(_guard) = self.acquire(topic) else {
            tracing::debug!("AI support request already in flight for topic={}", topic);
            return SupportReply {
                response: PENDING_RESPONSE.to_string(),
                cta: None,
                source: SupportSource::Pending,
            };
        };

        match self.call_gateway(topic, context).await {
            Ok(response) => {
                self.store(topic, &response);
                SupportReply {
                    response: response.response,
                    cta: response.cta,
                    source: SupportSource::Gateway,
                }
            }
            Err(e) => {
                tracing::warn!("AI support gateway failed for topic={}: {:#}", topic, e);
                Self::fallback()
            }
        }
    }

    async fn call_gateway(&self, topic: &str, context: Option<String>) -> Result<ChatResponse> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            message: format!(
                "Em chưa hiểu chủ đề \"{}\". Hãy giải thích ngắn gọn lý thuyết và cho một ví dụ minh họa.",
                topic
            ),
            context,
        };

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("Failed to call AI support gateway")?;

        if !response.status().is_success() {
            anyhow::bail!("AI support gateway returned status: {}", response.status());
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse AI support gateway response")?;

        if parsed.response.trim().is_empty() {
            anyhow::bail!("AI support gateway returned an empty response");
        }

        Ok(parsed)
    }

    fn acquire(&self, topic: &str) -> Option<InFlightGuard> {
        let mut topics = self.in_flight.lock().ok()?;
        if !topics.insert(topic.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            topic: topic.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    fn cached(&self, topic: &str) -> Option<ChatResponse> {
        let mut cache = self.cache.lock().ok()?;
        match cache.get(topic) {
            Some((response, stored_at)) if stored_at.elapsed() < self.cache_ttl => {
                Some(response.clone())
            }
            Some(_) => {
                cache.remove(topic);
                None
            }
            None => None,
        }
    }

    fn store(&self, topic: &str, response: &ChatResponse) {
        if self.cache_ttl.is_zero() {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            let ttl = self.cache_ttl;
            cache.retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
            cache.insert(topic.to_string(), (response.clone(), Instant::now()));
        }
    }

    fn fallback() -> SupportReply {
        SupportReply {
            response: FALLBACK_RESPONSE.to_string(),
            cta: None,
            source: SupportSource::Fallback,
        }
    }
}
