use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{AuditLevel, AuditLog};
use crate::db::queries;
use crate::error::AppError;

/// Append-only operational log. `record` is fire-and-forget: a failed insert
/// is traced and swallowed so logging can never abort the operation that
/// produced the event.
#[derive(Clone)]
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        level: AuditLevel,
        source: &str,
        message: &str,
        details: serde_json::Value,
        related_user_id: Option<Uuid>,
    ) {
        let log = AuditLog {
            id: Uuid::new_v4(),
            level: level.as_str().to_string(),
            source: source.to_string(),
            message: message.to_string(),
            details: Some(details),
            related_user_id,
            resolved: false,
            resolved_by: None,
            resolution_notes: None,
            created_at: Utc::now(),
            resolved_at: None,
        };

        if let Err(e) = queries::insert_audit_log(&self.pool, &log).await {
            tracing::warn!(source = source, error = %e, "Failed to write audit log entry");
        }
    }

    /// Marks an entry as handled during manual triage.
    pub async fn resolve(
        &self,
        log_id: Uuid,
        resolver_id: Uuid,
        notes: &str,
    ) -> Result<(), AppError> {
        let affected = queries::resolve_audit_log(&self.pool, log_id, resolver_id, notes).await?;

        if affected == 0 {
            return Err(AppError::NotFound(format!(
                "Audit log {} not found or already resolved",
                log_id
            )));
        }

        Ok(())
    }
}
