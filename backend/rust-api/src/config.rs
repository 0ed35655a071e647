use serde::Deserialize;
use std::env;

use crate::adaptive::{AdaptiveSettings, SelectionOrder};

#[derive(Debug, Clone, Deserialize)]
pub struct AiSupportConfig {
    pub url: String,
    pub enabled: bool,
    pub timeout_ms: u64,
    pub cache_ttl_seconds: u64,
}

impl Default for AiSupportConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5000".to_string(),
            enabled: true,
            timeout_ms: 3000,
            cache_ttl_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub redis_uri: Option<String>,
    pub question_bank_path: String,
    pub questions_collection: Option<String>,
    pub support_content_path: String,
    pub ai_support: AiSupportConfig,
    pub adaptive: AdaptiveSettings,
    pub session_ttl_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".to_string(),
            mongo_uri: None,
            mongo_database: "adaptive_math".to_string(),
            redis_uri: None,
            question_bank_path: "data/questions.json".to_string(),
            questions_collection: None,
            support_content_path: "data/support_content.json".to_string(),
            ai_support: AiSupportConfig::default(),
            adaptive: AdaptiveSettings::default(),
            session_ttl_seconds: 3600,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Root .env first, then the working directory
        let skip_root_env = env::var("SKIP_ROOT_ENV").is_ok();
        if skip_root_env {
            dotenvy::dotenv().ok();
        } else if dotenvy::from_path("../../.env").is_err() {
            dotenvy::dotenv().ok();
        }

        // Determine environment (defaults to dev)
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(config::File::with_name(&format!("config/{}", app_env)).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let defaults = Config::default();

        let bind_addr = string_setting(&settings, "server.bind_addr", "BIND_ADDR")
            .unwrap_or(defaults.bind_addr);

        let mongo_uri = string_setting(&settings, "database.mongo_uri", "MONGO_URI");
        let mongo_database =
            string_setting(&settings, "database.mongo_database", "MONGO_DATABASE")
                .unwrap_or(defaults.mongo_database);

        let redis_uri = string_setting(&settings, "redis.uri", "REDIS_URI");

        let question_bank_path =
            string_setting(&settings, "questions.bank_path", "QUESTION_BANK_PATH")
                .unwrap_or(defaults.question_bank_path);
        let questions_collection =
            string_setting(&settings, "questions.collection", "QUESTIONS_COLLECTION");
        let support_content_path =
            string_setting(&settings, "support.content_path", "SUPPORT_CONTENT_PATH")
                .unwrap_or(defaults.support_content_path);

        let ai_support = AiSupportConfig {
            url: string_setting(&settings, "ai_support.url", "AI_SUPPORT_URL")
                .unwrap_or(defaults.ai_support.url),
            enabled: bool_setting(&settings, "ai_support.enabled", "AI_SUPPORT_ENABLED")?
                .unwrap_or(defaults.ai_support.enabled),
            timeout_ms: uint_setting(&settings, "ai_support.timeout_ms", "AI_SUPPORT_TIMEOUT_MS")?
                .unwrap_or(defaults.ai_support.timeout_ms),
            cache_ttl_seconds: uint_setting(
                &settings,
                "ai_support.cache_ttl_seconds",
                "AI_SUPPORT_CACHE_TTL_SECONDS",
            )?
            .unwrap_or(defaults.ai_support.cache_ttl_seconds),
        };

        let adaptive = AdaptiveSettings {
            batch_size: uint_setting(&settings, "adaptive.batch_size", "ADAPTIVE_BATCH_SIZE")?
                .map(|v| v as usize)
                .unwrap_or(defaults.adaptive.batch_size),
            pass_threshold: uint_setting(
                &settings,
                "adaptive.pass_threshold",
                "ADAPTIVE_PASS_THRESHOLD",
            )?
            .map(|v| v as usize)
            .unwrap_or(defaults.adaptive.pass_threshold),
            supplementary_size: uint_setting(
                &settings,
                "adaptive.supplementary_size",
                "ADAPTIVE_SUPPLEMENTARY_SIZE",
            )?
            .map(|v| v as usize)
            .unwrap_or(defaults.adaptive.supplementary_size),
            order: match uint_setting(&settings, "adaptive.shuffle_seed", "ADAPTIVE_SHUFFLE_SEED")?
            {
                Some(seed) => SelectionOrder::Seeded(seed),
                None => SelectionOrder::BankOrder,
            },
        };
        adaptive.validate().map_err(config::ConfigError::Message)?;

        let session_ttl_seconds =
            uint_setting(&settings, "session.ttl_seconds", "SESSION_TTL_SECONDS")?
                .filter(|v| *v > 0)
                .unwrap_or(defaults.session_ttl_seconds);

        Ok(Config {
            bind_addr,
            mongo_uri,
            mongo_database,
            redis_uri,
            question_bank_path,
            questions_collection,
            support_content_path,
            ai_support,
            adaptive,
            session_ttl_seconds,
        })
    }
}

/// Value from config file / `APP__*` first, then the plain env var. Blank
/// values count as unset.
fn string_setting(settings: &config::Config, key: &str, env_key: &str) -> Option<String> {
    settings
        .get_string(key)
        .ok()
        .or_else(|| env::var(env_key).ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn uint_setting(
    settings: &config::Config,
    key: &str,
    env_key: &str,
) -> Result<Option<u64>, config::ConfigError> {
    match string_setting(settings, key, env_key) {
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            config::ConfigError::Message(format!("{} must be a non-negative integer, got {:?}", key, raw))
        }),
        None => Ok(None),
    }
}

fn bool_setting(
    settings: &config::Config,
    key: &str,
    env_key: &str,
) -> Result<Option<bool>, config::ConfigError> {
    match string_setting(settings, key, env_key) {
        Some(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(config::ConfigError::Message(format!(
                "{} must be a boolean, got {:?}",
                key, raw
            ))),
        },
        None => Ok(None),
    }
}
