use axum::{
    extract::Request,
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod adaptive;
pub mod config;
pub mod errors;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

/// CSP middleware adds Content-Security-Policy header to all responses
async fn csp_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    response.headers_mut().insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    response
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // The learner UI is served from another origin.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::HeaderName::from_static("x-trace-id")])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn(handlers::metrics_auth_middleware)),
        )
        .nest("/api/v1/sessions", sessions_routes())
        .route(
            "/api/questions/math",
            get(handlers::questions::list_math_questions),
        )
        .with_state(app_state)
        // Outermost first
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(
                    middlewares::trace::trace_context_middleware,
                ))
                .layer(middleware::from_fn(middlewares::metrics::metrics_middleware))
                .layer(middleware::from_fn(csp_middleware))
                .layer(cors),
        )
}

fn sessions_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::sessions::create_session))
        .route("/{id}", get(handlers::sessions::get_session))
        .route("/{id}/start", post(handlers::sessions::start_session))
        .route("/{id}/answers", post(handlers::sessions::submit_answer))
        .route("/{id}/review", post(handlers::sessions::open_review))
        .route(
            "/{id}/review/{rid}/continue-fail",
            post(handlers::sessions::continue_fail),
        )
        .route(
            "/{id}/review/{rid}/continue-supplementary",
            post(handlers::sessions::continue_supplementary),
        )
        .route("/{id}/summary", get(handlers::sessions::get_summary))
}
