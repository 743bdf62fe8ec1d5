use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod repository;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::{CoreError, CoreResult};
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
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(middlewares::auth::DEVICE_FINGERPRINT_HEADER),
            HeaderName::from_static(middlewares::trace::TRACE_ID_HEADER),
        ])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        // Metrics endpoint with Basic Auth protection
        .route(
            "/metrics",
            get(handlers::metrics_handler)
                .layer(middleware::from_fn_with_state(
                    app_state.clone(),
                    handlers::metrics_auth_middleware,
                )),
        )
        .nest("/api/v1/quizzes", quiz_routes())
        .nest(
            "/api/v1/payments",
            payment_routes().route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                middlewares::rate_limit::payment_rate_limit_middleware,
            )),
        )
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(csp_middleware)) // Apply CSP to all responses
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn quiz_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/today", get(handlers::quizzes::get_today_quiz))
        .route(
            "/{id}/participation",
            get(handlers::quizzes::get_participation),
        )
        .route("/{id}/questions", get(handlers::quizzes::get_questions))
        .route("/{id}/submit", post(handlers::quizzes::submit_quiz))
        .route("/{id}/leaderboard", get(handlers::quizzes::get_leaderboard))
}

fn payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(handlers::payments::create_order))
        .route("/verify", post(handlers::payments::verify_payment))
}
