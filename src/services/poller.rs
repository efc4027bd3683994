use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::db::queries;
use crate::services::orchestrator::TransactionOrchestrator;

const BATCH_SIZE: i64 = 10;

/// Runs the background reconciliation loop. Webhooks and client polls are the
/// primary notification channels; this loop only bounds how long a lost
/// webhook can leave a transaction stuck in an open state.
pub async fn run_poller(
    pool: PgPool,
    orchestrator: TransactionOrchestrator,
    poll_interval_secs: u64,
    stale_after_secs: i64,
) {
    info!("Transaction reconciliation poller started");

    loop {
        if let Err(e) = poll_once(&pool, &orchestrator, stale_after_secs).await {
            error!("Poller batch error: {}", e);
        }

        sleep(Duration::from_secs(poll_interval_secs)).await;
    }
}

/// One poller pass. Reads candidate ids without holding locks; each
/// `check_status` call takes the row lock itself, so a concurrent webhook for
/// the same transaction serializes instead of deadlocking.
pub async fn poll_once(
    pool: &PgPool,
    orchestrator: &TransactionOrchestrator,
    stale_after_secs: i64,
) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - ChronoDuration::seconds(stale_after_secs);
    let stale = queries::list_stale_open_transactions(pool, cutoff, BATCH_SIZE).await?;

    if stale.is_empty() {
        return Ok(0);
    }

    debug!("Reconciling {} stale transaction(s)", stale.len());

    let mut refreshed = 0;
    for transaction_id in stale {
        match orchestrator.check_status(transaction_id).await {
            Ok(_) => refreshed += 1,
            Err(e) => {
                warn!(
                    transaction_id = %transaction_id,
                    error = %e,
                    "Poller could not refresh transaction"
                );
            }
        }
    }

    Ok(refreshed)
}
