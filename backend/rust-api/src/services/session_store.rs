use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::metrics::track_store_operation;
use crate::models::TestSession;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {0} not found")]
    NotFound(String),
    #[error("session {0} already exists")]
    AlreadyExists(String),
    /// Another writer saved the session first.
    #[error("session {id} changed concurrently (expected version {expected})")]
    Conflict { id: String, expected: u64 },
    #[error("failed to (de)serialize session: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Persistence for in-progress test sessions.
///
/// `save` is a compare-and-set: it only succeeds when the stored version equals
/// `expected_version`, and stores the session with `version` bumped by one.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn get(&self, id: &str) -> Result<TestSession, StoreError>;

    async fn insert(&self, session: &TestSession) -> Result<(), StoreError>;

    async fn save(
        &self,
        session: &TestSession,
        expected_version: u64,
    ) -> Result<TestSession, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, TestSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, id: &str) -> Result<TestSession, StoreError> {
        track_store_operation("memory", "get", async {
            self.sessions
                .read()
                .await
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(id.to_string()))
        })
        .await
    }

    async fn insert(&self, session: &TestSession) -> Result<(), StoreError> {
        track_store_operation("memory", "insert", async {
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&session.id) {
                return Err(StoreError::AlreadyExists(session.id.clone()));
            }
            sessions.insert(session.id.clone(), session.clone());
            Ok(())
        })
        .await
    }

    async fn save(
        &self,
        session: &TestSession,
        expected_version: u64,
    ) -> Result<TestSession, StoreError> {
        track_store_operation("memory", "save", async {
            let mut sessions = self.sessions.write().await;
            let current = sessions
                .get(&session.id)
                .ok_or_else(|| StoreError::NotFound(session.id.clone()))?;
            if current.version != expected_version {
                return Err(StoreError::Conflict {
                    id: session.id.clone(),
                    expected: expected_version,
                });
            }

            let mut stored = session.clone();
            stored.version = expected_version + 1;
            sessions.insert(stored.id.clone(), stored.clone());
            Ok(stored)
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// Compare-and-set on the JSON `version` field, atomically inside Redis.
const CAS_SCRIPT: &str = r#"
    local current = redis.call('GET', KEYS[1])
    if current == false then
        return -1
    end

    local stored = cjson.decode(current)
    if tonumber(stored['version']) ~= tonumber(ARGV[1]) then
        return 0
    end

    redis.call('SET', KEYS[1], ARGV[2], 'EX', ARGV[3])
    return 1
"#;

/// Maps the CAS script's return code: 1 saved, -1 missing key, 0 stale version.
fn cas_outcome(
    outcome: i64,
    stored: TestSession,
    expected_version: u64,
) -> Result<TestSession, StoreError> {
    match outcome {
        1 => Ok(stored),
        -1 => Err(StoreError::NotFound(stored.id)),
        _ => Err(StoreError::Conflict {
            id: stored.id,
            expected: expected_version,
        }),
    }
}

pub struct RedisSessionStore {
    redis: ConnectionManager,
    ttl: Duration,
}

impl RedisSessionStore {
    pub fn new(redis: ConnectionManager, ttl: Duration) -> Self {
        Self { redis, ttl }
    }

    fn key(id: &str) -> String {
        format!("adaptive:session:{}", id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, id: &str) -> Result<TestSession, StoreError> {
        let key = Self::key(id);
        let raw: Option<String> = track_store_operation("redis", "get", async {
            retry_async_with_config(RetryConfig::default(), || async {
                let mut conn = self.redis.clone();
                redis::cmd("GET")
                    .arg(&key)
                    .query_async::<Option<String>>(&mut conn)
                    .await
            })
            .await
        })
        .await?;

        let raw = raw.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn insert(&self, session: &TestSession) -> Result<(), StoreError> {
        let key = Self::key(&session.id);
        let json = serde_json::to_string(session)?;

        // SET NX: a second insert with the same id must not clobber the first.
        let created: Option<String> = track_store_operation("redis", "insert", async {
            let mut conn = self.redis.clone();
            redis::cmd("SET")
                .arg(&key)
                .arg(&json)
                .arg("EX")
                .arg(self.ttl.as_secs())
                .arg("NX")
                .query_async::<Option<String>>(&mut conn)
                .await
        })
        .await?;

        match created {
            Some(_) => Ok(()),
            None => Err(StoreError::AlreadyExists(session.id.clone())),
        }
    }

    async fn save(
        &self,
        session: &TestSession,
        expected_version: u64,
    ) -> Result<TestSession, StoreError> {
        let key = Self::key(&session.id);
        let mut stored = session.clone();
        stored.version = expected_version + 1;
        let json = serde_json::to_string(&stored)?;

        let outcome: i64 = track_store_operation("redis", "save", async {
            let mut conn = self.redis.clone();
            redis::Script::new(CAS_SCRIPT)
                .key(&key)
                .arg(expected_version)
                .arg(&json)
                .arg(self.ttl.as_secs())
                .invoke_async(&mut conn)
                .await
        })
        .await?;

        cas_outcome(outcome, stored, expected_version)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
