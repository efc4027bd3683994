//! Balance ledger. The only code allowed to touch `users.balance`; callers
//! couple these mutations with their own transaction-store writes by passing
//! the surrounding sqlx transaction in.

use sqlx::types::BigDecimal;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::error::AppError;

pub async fn balance_of(pool: &PgPool, user_id: Uuid) -> Result<BigDecimal, AppError> {
    let row: Option<(BigDecimal,)> = sqlx::query_as("SELECT balance FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.map(|(balance,)| balance)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Atomically adds to the user's balance and returns the new value.
pub async fn credit(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<BigDecimal, AppError> {
    let row: Option<(BigDecimal,)> = sqlx::query_as(
        "UPDATE users SET balance = balance + $2, updated_at = NOW() WHERE id = $1 RETURNING balance",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **executor)
    .await?;

    row.map(|(balance,)| balance)
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
}

/// Atomically subtracts from the user's balance, failing with
/// `InsufficientFunds` instead of going negative. The user row is locked
/// first so two concurrent debits serialize; the conditional update is the
/// hard stop either way.
pub async fn debit(
    executor: &mut SqlxTransaction<'_, Postgres>,
    user_id: Uuid,
    amount: &BigDecimal,
) -> Result<BigDecimal, AppError> {
    let current: Option<(BigDecimal,)> =
        sqlx::query_as("SELECT balance FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **executor)
            .await?;

    let Some((current,)) = current else {
        return Err(AppError::NotFound(format!("User {} not found", user_id)));
    };

    if &current < amount {
        return Err(AppError::InsufficientFunds);
    }

    let row: Option<(BigDecimal,)> = sqlx::query_as(
        r#"
        UPDATE users
        SET balance = balance - $2, updated_at = NOW()
        WHERE id = $1 AND balance >= $2
        RETURNING balance
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut **executor)
    .await?;

    row.map(|(balance,)| balance)
        .ok_or(AppError::InsufficientFunds)
}
