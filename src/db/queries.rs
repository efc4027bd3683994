use sqlx::{PgPool, Postgres, Result, Transaction as SqlxTransaction};
use crate::db::models::{AuditLog, Gateway, Transaction};
use chrono::{DateTime, Utc};
use uuid::Uuid;

// --- Transaction queries ---

pub async fn insert_transaction(
    executor: &mut SqlxTransaction<'_, Postgres>,
    tx: &Transaction,
) -> Result<Transaction> {
    sqlx::query_as::<_, Transaction>(
        r#"
        INSERT INTO transactions (
            id, user_id, kind, amount, payment_method, gateway_id,
            gateway_transaction_id, status, details, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(tx.id)
    .bind(tx.user_id)
    .bind(&tx.kind)
    .bind(&tx.amount)
    .bind(&tx.payment_method)
    .bind(tx.gateway_id)
    .bind(&tx.gateway_transaction_id)
    .bind(&tx.status)
    .bind(&tx.details)
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .fetch_one(&mut **executor)
    .await
}

pub async fn get_transaction(pool: &PgPool, id: Uuid) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Locks the row for the remainder of the surrounding transaction so
/// concurrent status updates serialize on it.
pub async fn get_transaction_for_update(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **executor)
        .await
}

pub async fn get_transaction_by_gateway_reference(
    pool: &PgPool,
    gateway_id: Uuid,
    reference: &str,
) -> Result<Option<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE gateway_id = $1 AND gateway_transaction_id = $2",
    )
    .bind(gateway_id)
    .bind(reference)
    .fetch_optional(pool)
    .await
}

pub async fn list_user_transactions(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Transaction>> {
    sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Sets the provider's reference exactly once. Rows with a reference already
/// present are left untouched; the caller checks the affected count.
pub async fn set_gateway_reference(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    reference: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET gateway_transaction_id = $2, updated_at = NOW()
        WHERE id = $1 AND gateway_transaction_id IS NULL
        "#,
    )
    .bind(id)
    .bind(reference)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected())
}

/// Advances `status` and appends one entry to the `details` trail. Terminal
/// rows are excluded in SQL, so a racing update that already finished the
/// transaction results in zero affected rows rather than a rewrite.
pub async fn update_transaction_status(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    status: &str,
    detail: &serde_json::Value,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET status = $2, details = details || $3::jsonb, updated_at = NOW()
        WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(detail)
    .execute(&mut **executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn append_transaction_detail(
    executor: &mut SqlxTransaction<'_, Postgres>,
    id: Uuid,
    detail: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE transactions SET details = details || $2::jsonb, updated_at = NOW() WHERE id = $1",
    )
    .bind(id)
    .bind(detail)
    .execute(&mut **executor)
    .await?;

    Ok(())
}

/// Non-terminal transactions that have not been touched for a while. Used by
/// the reconciliation poller; plain read, the poller lets `check_status` take
/// the row lock itself.
pub async fn list_stale_open_transactions(
    pool: &PgPool,
    older_than: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM transactions
        WHERE status IN ('pending', 'processing') AND updated_at <= $1
        ORDER BY updated_at ASC
        LIMIT $2
        "#,
    )
    .bind(older_than)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// --- Gateway queries ---

/// Reads the gateway row directly from Postgres. Called at the start of every
/// orchestrator operation; configuration is never cached across requests, so
/// rotated credentials apply on the next transaction.
pub async fn get_gateway(pool: &PgPool, id: Uuid) -> Result<Option<Gateway>> {
    sqlx::query_as::<_, Gateway>("SELECT * FROM gateways WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// --- Audit log queries ---

pub async fn insert_audit_log(pool: &PgPool, log: &AuditLog) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_logs (
            id, level, source, message, details, related_user_id,
            resolved, resolved_by, resolution_notes, created_at, resolved_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(log.id)
    .bind(&log.level)
    .bind(&log.source)
    .bind(&log.message)
    .bind(&log.details)
    .bind(log.related_user_id)
    .bind(log.resolved)
    .bind(log.resolved_by)
    .bind(&log.resolution_notes)
    .bind(log.created_at)
    .bind(log.resolved_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn resolve_audit_log(
    pool: &PgPool,
    id: Uuid,
    resolver_id: Uuid,
    notes: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE audit_logs
        SET resolved = TRUE, resolved_by = $2, resolution_notes = $3, resolved_at = NOW()
        WHERE id = $1 AND resolved = FALSE
        "#,
    )
    .bind(id)
    .bind(resolver_id)
    .bind(notes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn list_audit_logs_for_transaction(
    pool: &PgPool,
    transaction_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<AuditLog>> {
    sqlx::query_as::<_, AuditLog>(
        r#"
        SELECT * FROM audit_logs
        WHERE details->>'transaction_id' = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(transaction_id.to_string())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
