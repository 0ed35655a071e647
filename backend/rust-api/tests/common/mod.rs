#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

use adaptive_math_api::{
    adaptive::{QuestionBank, SupportCatalog},
    config::{AiSupportConfig, Config},
    create_router,
    models::SupportContent,
    services::{
        ai_support_service::AiSupportService, results_service::ResultsService,
        session_store::MemorySessionStore, AppState,
    },
};

/// Every question's correct option is "A"; "B" is always wrong.
pub const RIGHT: &str = "A";
pub const WRONG: &str = "B";

const FIXTURE_BANK: &str = r#"{
    "questions": [
        {"id": "r1", "lesson": 1, "difficulty": "recognition", "question": "R1", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "explanation": "E-r1", "topic": "Số tự nhiên"},
        {"id": "r2", "lesson": 1, "difficulty": "recognition", "question": "R2", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "explanation": "E-r2", "topic": "Số tự nhiên"},
        {"id": "r3", "lesson": 2, "difficulty": "recognition", "question": "R3", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "explanation": "E-r3", "topic": "Phân số"},
        {"id": "r4", "lesson": 2, "difficulty": "recognition", "question": "R4", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "explanation": "E-r4", "topic": "Phân số"},
        {"id": "r5", "lesson": 3, "difficulty": "recognition", "question": "R5", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "explanation": "E-r5", "topic": "Số thập phân"},
        {"id": "u1", "lesson": 1, "difficulty": "understanding", "question": "U1", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Số tự nhiên"},
        {"id": "u2", "lesson": 2, "difficulty": "understanding", "question": "U2", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Phân số"},
        {"id": "u3", "lesson": 3, "difficulty": "understanding", "question": "U3", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Số thập phân"},
        {"id": "u4", "lesson": 4, "difficulty": "understanding", "question": "U4", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Hình học"},
        {"id": "u5", "lesson": 5, "difficulty": "understanding", "question": "U5", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Tỉ số phần trăm"},
        {"id": "a1", "lesson": 1, "difficulty": "application", "question": "A1", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Số tự nhiên"},
        {"id": "a2", "lesson": 2, "difficulty": "application", "question": "A2", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Phân số"},
        {"id": "a3", "lesson": 3, "difficulty": "application", "question": "A3", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Số thập phân"},
        {"id": "a4", "lesson": 4, "difficulty": "application", "question": "A4", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Hình học"},
        {"id": "a5", "lesson": 5, "difficulty": "application", "question": "A5", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Tỉ số phần trăm"}
    ],
    "supplementary": [
        {"id": "s1", "lesson": 1, "difficulty": "recognition", "question": "S1", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Số tự nhiên"},
        {"id": "s2", "lesson": 2, "difficulty": "recognition", "question": "S2", "options": ["A", "B", "C", "D"], "correctAnswer": "A", "topic": "Phân số"}
    ]
}"#;

pub fn test_config() -> Config {
    Config {
        ai_support: AiSupportConfig {
            // Nothing listens here: every gateway call fails fast.
            url: "http://127.0.0.1:1".to_string(),
            enabled: true,
            timeout_ms: 500,
            cache_ttl_seconds: 0,
        },
        ..Config::default()
    }
}

pub fn create_test_app() -> Router {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let config = test_config();
    let bank = QuestionBank::from_json_str(FIXTURE_BANK).expect("fixture bank");

    let mut topics = HashMap::new();
    topics.insert(
        "Phân số".to_string(),
        SupportContent {
            theory: "Lý thuyết phân số".to_string(),
            example: "1/3 + 1/6 = 1/2".to_string(),
        },
    );

    let ai_support = AiSupportService::new(&config.ai_support).expect("ai support client");
    let state = AppState::with_components(
        config,
        None,
        Arc::new(MemorySessionStore::new()),
        bank,
        SupportCatalog::new(topics),
        ai_support,
        ResultsService::default(),
    );

    create_router(Arc::new(state))
}

pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            panic!("non-JSON body ({}): {}", status, String::from_utf8_lossy(&bytes))
        })
    };
    (status, json)
}

/// Creates and starts a session, returning its id and the start response.
pub async fn start_session(app: &Router) -> (String, Value) {
    let (status, created) = send(
        app,
        "POST",
        "/api/v1/sessions",
        Some(serde_json::json!({ "user_id": "hs-001" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let id = created["session"]["id"].as_str().unwrap().to_string();

    let (status, started) = send(app, "POST", &format!("/api/v1/sessions/{}/start", id), None).await;
    assert_eq!(status, StatusCode::OK, "{}", started);
    (id, started)
}

/// Answers the current question with `answer`.
pub async fn answer_current(app: &Router, id: &str, session: &Value, answer: &str) -> (StatusCode, Value) {
    let question_id = session["current_question"]["id"]
        .as_str()
        .unwrap_or_else(|| panic!("no current question in {}", session))
        .to_string();
    send(
        app,
        "POST",
        &format!("/api/v1/sessions/{}/answers", id),
        Some(serde_json::json!({
            "question_id": question_id,
            "answer": answer,
            "time_spent_ms": 1200
        })),
    )
    .await
}

/// Answers the current batch in order; `true` means a correct answer.
/// Returns the response to the last answer.
pub async fn answer_batch(app: &Router, id: &str, mut session: Value, pattern: &[bool]) -> Value {
    let mut last = Value::Null;
    for correct in pattern {
        let (status, body) =
            answer_current(app, id, &session, if *correct { RIGHT } else { WRONG }).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        session = body["session"].clone();
        last = body;
    }
    last
}
