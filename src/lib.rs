pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod secrets;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use axum::{
    Router,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::services::TransactionOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub orchestrator: TransactionOrchestrator,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::transactions::deposit,
        handlers::transactions::withdraw,
        handlers::transactions::status,
        handlers::transactions::list_for_user,
        handlers::transactions::audit_trail,
    ),
    components(schemas(
        handlers::HealthStatus,
        handlers::DbPoolStats,
        handlers::transactions::DepositRequest,
        handlers::transactions::DepositResponse,
        handlers::transactions::WithdrawRequest,
        handlers::transactions::WithdrawResponse,
        db::models::PaymentMethod,
        db::models::TransactionKind,
        db::models::TransactionStatus,
        gateway::WithdrawDestination,
        gateway::PaymentArtifacts,
    ))
)]
pub struct ApiDoc;

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/transactions/deposit",
            post(handlers::transactions::deposit),
        )
        .route(
            "/transactions/withdraw",
            post(handlers::transactions::withdraw),
        )
        .route(
            "/transactions/status/:id",
            get(handlers::transactions::status),
        )
        .route(
            "/transactions/user",
            get(handlers::transactions::list_for_user),
        )
        .route(
            "/transactions/:id/audit",
            get(handlers::transactions::audit_trail),
        )
        .route(
            "/webhooks/:gateway_id/callback",
            post(handlers::webhook::callback),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
