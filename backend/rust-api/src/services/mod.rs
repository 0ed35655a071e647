use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use crate::adaptive::{Controller, QuestionBank, SupportCatalog};
use crate::config::Config;

pub mod ai_support_service;
pub mod question_bank_service;
pub mod results_service;
pub mod session_service;
pub mod session_store;

use ai_support_service::AiSupportService;
use results_service::ResultsService;
use session_service::SessionService;
use session_store::{MemorySessionStore, RedisSessionStore, SessionStore};

pub struct AppState {
    pub config: Config,
    pub mongo: Option<Database>,
    pub store: Arc<dyn SessionStore>,
    pub bank: Arc<QuestionBank>,
    pub sessions: SessionService,
}

impl AppState {
    /// Connects the optional backends, loads the bank and wires the engine.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let mongo = match &config.mongo_uri {
            Some(uri) => {
                let client = MongoClient::with_uri_str(uri)
                    .await
                    .context("Failed to connect to MongoDB")?;
                tracing::info!("MongoDB connected");
                Some(client.database(&config.mongo_database))
            }
            None => {
                tracing::info!("MONGO_URI not set, results will not be archived");
                None
            }
        };

        let store: Arc<dyn SessionStore> = match &config.redis_uri {
            Some(uri) => {
                let redis = connect_redis(uri).await?;
                Arc::new(RedisSessionStore::new(
                    redis,
                    Duration::from_secs(config.session_ttl_seconds),
                ))
            }
            None => {
                tracing::info!("REDIS_URI not set, using in-memory session store");
                Arc::new(MemorySessionStore::new())
            }
        };

        let bank = question_bank_service::load_question_bank(&config, mongo.as_ref()).await?;
        let catalog = question_bank_service::load_support_catalog(&config)?;
        let ai_support = AiSupportService::new(&config.ai_support)?;
        let results = ResultsService::new(mongo.clone());

        Ok(Self::with_components(
            config, mongo, store, bank, catalog, ai_support, results,
        ))
    }

    pub fn with_components(
        config: Config,
        mongo: Option<Database>,
        store: Arc<dyn SessionStore>,
        bank: QuestionBank,
        catalog: SupportCatalog,
        ai_support: AiSupportService,
        results: ResultsService,
    ) -> Self {
        let bank = Arc::new(bank);
        let controller = Arc::new(Controller::new(
            config.adaptive,
            Arc::clone(&bank),
            Arc::new(catalog),
        ));
        let sessions = SessionService::new(
            Arc::clone(&store),
            controller,
            Arc::new(ai_support),
            results,
        );

        Self {
            config,
            mongo,
            store,
            bank,
            sessions,
        }
    }
}

async fn connect_redis(uri: &str) -> anyhow::Result<ConnectionManager> {
    tracing::info!("Attempting to connect to Redis...");
    let client = redis::Client::open(uri).context("Failed to create Redis client")?;

    let redis = tokio::time::timeout(Duration::from_secs(30), ConnectionManager::new(client))
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

    let mut conn = redis.clone();
    tokio::time::timeout(
        Duration::from_secs(5),
        redis::cmd("PING").query_async::<String>(&mut conn),
    )
    .await
    .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

    tracing::info!("Redis connection established successfully");
    Ok(redis)
}
