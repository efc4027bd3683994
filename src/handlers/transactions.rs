use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use sqlx::types::BigDecimal;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::db::models::{PaymentMethod, Transaction};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::WithdrawDestination;
use crate::validation;

const PIX_KEY_MAX_LEN: usize = 140;
const PIX_KEY_TYPES: &[&str] = &["cpf", "cnpj", "email", "phone", "random"];

/// Caller identity, installed by the auth layer in front of this service.
fn user_id_from_headers(headers: &HeaderMap) -> Result<Uuid, AppError> {
    headers
        .get("x-user-id")
        .and_then(|h| h.to_str().ok())
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| AppError::Unauthorized("missing or invalid x-user-id".to_string()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequest {
    #[schema(value_type = String, example = "50.00")]
    pub amount: BigDecimal,
    pub payment_method: PaymentMethod,
    pub gateway_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositResponse {
    pub transaction_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pix_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

#[utoipa::path(
    post,
    path = "/transactions/deposit",
    request_body = DepositRequest,
    responses(
        (status = 201, description = "Deposit registered with the provider", body = DepositResponse),
        (status = 400, description = "Invalid amount, inactive gateway or unsupported method"),
        (status = 502, description = "Provider call failed")
    ),
    tag = "Transactions"
)]
pub async fn deposit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<DepositRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id_from_headers(&headers)?;

    let outcome = state
        .orchestrator
        .create_deposit(
            user_id,
            payload.amount,
            payload.payment_method,
            payload.gateway_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(DepositResponse {
            transaction_id: outcome.transaction.id,
            status: outcome.transaction.status,
            qr_code_url: outcome.artifacts.qr_code_url,
            pix_code: outcome.artifacts.pix_code,
            redirect_url: outcome.artifacts.redirect_url,
        }),
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawRequest {
    #[schema(value_type = String, example = "120.00")]
    pub amount: BigDecimal,
    pub payment_method: PaymentMethod,
    pub gateway_id: Uuid,
    #[serde(flatten)]
    pub destination: WithdrawDestination,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WithdrawResponse {
    pub transaction_id: Uuid,
    pub status: String,
    pub new_balance: String,
}

#[utoipa::path(
    post,
    path = "/transactions/withdraw",
    request_body = WithdrawRequest,
    responses(
        (status = 201, description = "Withdrawal registered with the provider", body = WithdrawResponse),
        (status = 400, description = "Invalid input or insufficient funds"),
        (status = 502, description = "Provider call failed")
    ),
    tag = "Transactions"
)]
pub async fn withdraw(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<WithdrawRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id_from_headers(&headers)?;

    if let Some(pix_key) = &payload.destination.pix_key {
        let pix_key = validation::sanitize_string(pix_key);
        validation::validate_required("pix_key", &pix_key)?;
        validation::validate_max_len("pix_key", &pix_key, PIX_KEY_MAX_LEN)?;
    }
    if let Some(key_type) = &payload.destination.pix_key_type {
        validation::validate_enum("pix_key_type", key_type, PIX_KEY_TYPES)?;
    }

    let outcome = state
        .orchestrator
        .create_withdraw(
            user_id,
            payload.amount,
            payload.payment_method,
            payload.gateway_id,
            payload.destination,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(WithdrawResponse {
            transaction_id: outcome.transaction.id,
            status: outcome.transaction.status,
            new_balance: outcome.new_balance.to_string(),
        }),
    ))
}

/// Returns 404 rather than 403 for rows owned by someone else, so the
/// endpoint does not leak which transaction ids exist.
fn check_ownership(tx: &Transaction, user_id: Uuid) -> Result<(), AppError> {
    if tx.user_id != user_id {
        return Err(AppError::NotFound(format!("Transaction {} not found", tx.id)));
    }
    Ok(())
}

#[utoipa::path(
    get,
    path = "/transactions/status/{id}",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Current transaction state"),
        (status = 404, description = "Unknown transaction")
    ),
    tag = "Transactions"
)]
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id_from_headers(&headers)?;

    let tx = queries::get_transaction(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;
    check_ownership(&tx, user_id)?;

    let refreshed = state.orchestrator.check_status(id).await?;
    Ok(Json(refreshed))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/transactions/user",
    responses((status = 200, description = "The caller's transactions, newest first")),
    tag = "Transactions"
)]
pub async fn list_for_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id_from_headers(&headers)?;
    let limit = pagination.limit.unwrap_or(20).clamp(1, 100);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let transactions = queries::list_user_transactions(&state.db, user_id, limit, offset).await?;

    Ok(Json(transactions))
}

#[utoipa::path(
    get,
    path = "/transactions/{id}/audit",
    params(("id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Audit entries for the transaction"),
        (status = 404, description = "Unknown transaction")
    ),
    tag = "Transactions"
)]
pub async fn audit_trail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = user_id_from_headers(&headers)?;
    let limit = pagination.limit.unwrap_or(50).clamp(1, 200);
    let offset = pagination.offset.unwrap_or(0).max(0);

    let tx = queries::get_transaction(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;
    check_ownership(&tx, user_id)?;

    let logs = queries::list_audit_logs_for_transaction(&state.db, id, limit, offset).await?;

    Ok(Json(logs))
}
