//! Transaction orchestrator: creates deposits and withdrawals against a
//! payment provider, and applies provider-reported status changes exactly
//! once, whether they arrive by client poll, webhook, or the background
//! poller.
//!
//! Every status transition runs inside one sqlx transaction with the
//! transaction row locked `FOR UPDATE` and its terminal-ness re-checked under
//! the lock. The balance mutation tied to a transition commits or rolls back
//! together with the status write.

use chrono::Utc;
use serde_json::json;
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::models::{
    AuditLevel, Gateway, PaymentMethod, Transaction, TransactionKind, TransactionStatus,
};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::{
    adapter_for, verify_webhook_signature, DepositContext, GatewayAdapter, GatewayHttpClient,
    PaymentArtifacts, StatusContext, WithdrawContext, WithdrawDestination,
};
use crate::secrets::{decrypt_gateway_credentials, GatewayCredentials, MasterKey};
use crate::services::audit::AuditLogger;
use crate::services::ledger;
use crate::utils::sanitize::sanitize_json;
use crate::validation;

#[derive(Debug)]
pub struct DepositOutcome {
    pub transaction: Transaction,
    pub artifacts: PaymentArtifacts,
}

#[derive(Debug)]
pub struct WithdrawOutcome {
    pub transaction: Transaction,
    pub new_balance: BigDecimal,
}

#[derive(Clone)]
pub struct TransactionOrchestrator {
    pool: PgPool,
    http: GatewayHttpClient,
    master_key: MasterKey,
    audit: AuditLogger,
}

struct LoadedGateway {
    gateway: Gateway,
    adapter: &'static dyn GatewayAdapter,
    credentials: GatewayCredentials,
}

impl TransactionOrchestrator {
    pub fn new(pool: PgPool, http: GatewayHttpClient, master_key: MasterKey) -> Self {
        let audit = AuditLogger::new(pool.clone());
        Self {
            pool,
            http,
            master_key,
            audit,
        }
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Fresh gateway read plus adapter and credential resolution. Called at
    /// the start of every operation; nothing here is cached, so a rotated
    /// credential or a deactivated gateway takes effect on the next call.
    async fn load_gateway(&self, gateway_id: Uuid) -> Result<LoadedGateway, AppError> {
        let gateway = queries::get_gateway(&self.pool, gateway_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Gateway {} not found", gateway_id)))?;

        if url::Url::parse(&gateway.api_endpoint).is_err() {
            return Err(AppError::GatewayMisconfigured(format!(
                "gateway {} has no usable API endpoint",
                gateway.name
            )));
        }

        let adapter = adapter_for(&gateway.name).ok_or_else(|| {
            AppError::GatewayMisconfigured(format!("no adapter for provider {}", gateway.name))
        })?;

        let credentials = decrypt_gateway_credentials(&self.master_key, &gateway)
            .map_err(|e| AppError::GatewayMisconfigured(e.to_string()))?;

        Ok(LoadedGateway {
            gateway,
            adapter,
            credentials,
        })
    }

    fn check_gateway_accepts(
        gateway: &Gateway,
        kind: TransactionKind,
        method: PaymentMethod,
    ) -> Result<(), AppError> {
        if !gateway.is_active {
            return Err(AppError::GatewayInactive(gateway.name.clone()));
        }
        if !gateway.supports_kind(kind) {
            return Err(AppError::Validation(format!(
                "gateway {} is not enabled for {}",
                gateway.name, kind
            )));
        }
        if !gateway.allows_method(method) {
            return Err(AppError::UnsupportedPaymentMethod(method.to_string()));
        }
        Ok(())
    }

    pub async fn create_deposit(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        method: PaymentMethod,
        gateway_id: Uuid,
    ) -> Result<DepositOutcome, AppError> {
        validation::validate_amount(&amount)?;

        let loaded = self.load_gateway(gateway_id).await?;
        Self::check_gateway_accepts(&loaded.gateway, TransactionKind::Deposit, method)?;

        let mut dbtx = self.pool.begin().await?;

        let tx = Transaction::new(
            user_id,
            TransactionKind::Deposit,
            amount.clone(),
            method,
            gateway_id,
        );
        let tx = queries::insert_transaction(&mut dbtx, &tx).await?;

        let request = loaded.adapter.build_deposit_request(&DepositContext {
            endpoint: &loaded.gateway.api_endpoint,
            credentials: &loaded.credentials,
            transaction_id: tx.id,
            amount: &amount,
            method,
        })?;
        let request_url = request.url.clone();

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                // No dangling pending row survives a failed provider call.
                dbtx.rollback().await?;
                self.report_gateway_failure("create_deposit", &tx, &request_url, &e.to_string())
                    .await;
                return Err(AppError::GatewayCallFailed(e.to_string()));
            }
        };

        let Some(reference) = loaded.adapter.extract_reference(&response) else {
            dbtx.rollback().await?;
            self.report_gateway_failure(
                "create_deposit",
                &tx,
                &request_url,
                "provider response carries no transaction id",
            )
            .await;
            return Err(AppError::GatewayCallFailed(
                "provider response carries no transaction id".to_string(),
            ));
        };

        queries::set_gateway_reference(&mut dbtx, tx.id, &reference).await?;
        queries::append_transaction_detail(
            &mut dbtx,
            tx.id,
            &json!({
                "event": "gateway_accepted",
                "operation": "deposit",
                "url": request_url,
                "gateway_transaction_id": reference.as_str(),
                "response": sanitize_json(&response),
                "at": Utc::now().to_rfc3339(),
            }),
        )
        .await?;

        dbtx.commit().await?;

        let transaction = queries::get_transaction(&self.pool, tx.id)
            .await?
            .ok_or_else(|| AppError::Internal("deposit row vanished after commit".to_string()))?;

        self.audit
            .record(
                AuditLevel::Info,
                "orchestrator.create_deposit",
                "Deposit registered with provider",
                json!({
                    "transaction_id": transaction.id,
                    "gateway_id": gateway_id,
                    "gateway_transaction_id": reference,
                    "amount": amount.to_string(),
                }),
                Some(user_id),
            )
            .await;

        let artifacts = loaded.adapter.extract_artifacts(&response);
        Ok(DepositOutcome {
            transaction,
            artifacts,
        })
    }

    pub async fn create_withdraw(
        &self,
        user_id: Uuid,
        amount: BigDecimal,
        method: PaymentMethod,
        gateway_id: Uuid,
        destination: WithdrawDestination,
    ) -> Result<WithdrawOutcome, AppError> {
        validation::validate_amount(&amount)?;

        let loaded = self.load_gateway(gateway_id).await?;
        Self::check_gateway_accepts(&loaded.gateway, TransactionKind::Withdraw, method)?;

        let mut dbtx = self.pool.begin().await?;

        // Funds check and debit up front, inside the same transaction as the
        // insert and the provider call: two racing withdrawals serialize on
        // the user row, and a failed provider call rolls the debit back.
        let new_balance = ledger::debit(&mut dbtx, user_id, &amount).await?;

        let tx = Transaction::new(
            user_id,
            TransactionKind::Withdraw,
            amount.clone(),
            method,
            gateway_id,
        );
        let tx = queries::insert_transaction(&mut dbtx, &tx).await?;
        queries::append_transaction_detail(
            &mut dbtx,
            tx.id,
            &json!({
                "event": "balance_debit",
                "amount": amount.to_string(),
                "balance_after": new_balance.to_string(),
                "at": Utc::now().to_rfc3339(),
            }),
        )
        .await?;

        let request = loaded.adapter.build_withdraw_request(&WithdrawContext {
            endpoint: &loaded.gateway.api_endpoint,
            credentials: &loaded.credentials,
            transaction_id: tx.id,
            amount: &amount,
            method,
            destination: &destination,
        })?;
        let request_url = request.url.clone();

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                dbtx.rollback().await?;
                self.report_gateway_failure("create_withdraw", &tx, &request_url, &e.to_string())
                    .await;
                return Err(AppError::GatewayCallFailed(e.to_string()));
            }
        };

        let Some(reference) = loaded.adapter.extract_reference(&response) else {
            dbtx.rollback().await?;
            self.report_gateway_failure(
                "create_withdraw",
                &tx,
                &request_url,
                "provider response carries no transaction id",
            )
            .await;
            return Err(AppError::GatewayCallFailed(
                "provider response carries no transaction id".to_string(),
            ));
        };

        queries::set_gateway_reference(&mut dbtx, tx.id, &reference).await?;
        queries::append_transaction_detail(
            &mut dbtx,
            tx.id,
            &json!({
                "event": "gateway_accepted",
                "operation": "withdraw",
                "url": request_url,
                "gateway_transaction_id": reference.as_str(),
                "response": sanitize_json(&response),
                "at": Utc::now().to_rfc3339(),
            }),
        )
        .await?;

        dbtx.commit().await?;

        let transaction = queries::get_transaction(&self.pool, tx.id)
            .await?
            .ok_or_else(|| AppError::Internal("withdraw row vanished after commit".to_string()))?;

        self.audit
            .record(
                AuditLevel::Info,
                "orchestrator.create_withdraw",
                "Withdrawal registered with provider",
                json!({
                    "transaction_id": transaction.id,
                    "gateway_id": gateway_id,
                    "gateway_transaction_id": reference,
                    "amount": amount.to_string(),
                    "new_balance": new_balance.to_string(),
                }),
                Some(user_id),
            )
            .await;

        Ok(WithdrawOutcome {
            transaction,
            new_balance,
        })
    }

    /// Refreshes one transaction from the provider. Terminal transactions are
    /// returned unchanged without a network call. A provider failure here is
    /// non-fatal: the caller gets the last known state and the failure goes
    /// to the audit log.
    pub async fn check_status(&self, transaction_id: Uuid) -> Result<Transaction, AppError> {
        let tx = queries::get_transaction(&self.pool, transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;

        if tx.is_terminal() {
            return Ok(tx);
        }

        let Some(reference) = tx.gateway_transaction_id.clone() else {
            // Never acknowledged by the provider; nothing to poll yet.
            return Ok(tx);
        };

        let loaded = self.load_gateway(tx.gateway_id).await?;
        let request = loaded.adapter.build_status_request(&StatusContext {
            endpoint: &loaded.gateway.api_endpoint,
            credentials: &loaded.credentials,
            gateway_reference: &reference,
        })?;

        let response = match self.http.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                self.audit
                    .record(
                        AuditLevel::Warning,
                        "orchestrator.check_status",
                        "Provider status query failed; returning last known status",
                        json!({
                            "transaction_id": tx.id,
                            "gateway_id": tx.gateway_id,
                            "error": e.to_string(),
                        }),
                        Some(tx.user_id),
                    )
                    .await;
                return Ok(tx);
            }
        };

        let mapped = loaded.adapter.map_status(&response);
        self.apply_transition(
            tx.id,
            mapped,
            json!({
                "event": "status_check",
                "gateway_transaction_id": reference,
                "response": sanitize_json(&response),
                "at": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    /// Ingests a provider-initiated status notification. Fails closed on a
    /// bad signature and refuses payloads for unknown transactions so
    /// integration bugs surface instead of disappearing.
    pub async fn ingest_webhook(
        &self,
        gateway_id: Uuid,
        raw_body: &[u8],
        signature: &str,
    ) -> Result<Transaction, AppError> {
        let loaded = self.load_gateway(gateway_id).await?;

        if !verify_webhook_signature(&loaded.credentials.webhook_secret, raw_body, signature) {
            self.audit
                .record(
                    AuditLevel::Warning,
                    "orchestrator.ingest_webhook",
                    "Webhook rejected: signature mismatch",
                    json!({ "gateway_id": gateway_id }),
                    None,
                )
                .await;
            return Err(AppError::InvalidSignature);
        }

        let payload: serde_json::Value = serde_json::from_slice(raw_body)
            .map_err(|e| AppError::Validation(format!("malformed webhook payload: {}", e)))?;

        let reference = loaded.adapter.extract_reference(&payload).ok_or_else(|| {
            AppError::Validation("webhook payload carries no transaction reference".to_string())
        })?;

        let tx = queries::get_transaction_by_gateway_reference(&self.pool, gateway_id, &reference)
            .await?;
        let Some(tx) = tx else {
            self.audit
                .record(
                    AuditLevel::Error,
                    "orchestrator.ingest_webhook",
                    "Webhook for unknown transaction",
                    json!({
                        "gateway_id": gateway_id,
                        "gateway_transaction_id": reference.as_str(),
                    }),
                    None,
                )
                .await;
            return Err(AppError::NotFound(format!(
                "Transaction for gateway reference {} not found",
                reference
            )));
        };

        let mapped = loaded.adapter.map_status(&payload);
        self.apply_transition(
            tx.id,
            mapped,
            json!({
                "event": "webhook",
                "gateway_transaction_id": reference,
                "payload": sanitize_json(&payload),
                "at": Utc::now().to_rfc3339(),
            }),
        )
        .await
    }

    /// The single write path for status changes. Locks the row, re-checks
    /// terminal-ness under the lock, performs the status write and the
    /// coupled balance mutation in one transaction. A concurrent racer that
    /// lost the lock race observes the terminal status and no-ops, which is
    /// what makes the balance credit happen at most once.
    async fn apply_transition(
        &self,
        transaction_id: Uuid,
        new_status: TransactionStatus,
        detail: serde_json::Value,
    ) -> Result<Transaction, AppError> {
        let mut dbtx = self.pool.begin().await?;

        let current = queries::get_transaction_for_update(&mut dbtx, transaction_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Transaction {} not found", transaction_id))
            })?;

        let current_status: TransactionStatus = current
            .status()
            .map_err(AppError::Internal)?;
        let kind: TransactionKind = current.kind().map_err(AppError::Internal)?;

        if current_status.is_terminal() {
            dbtx.commit().await?;
            return Ok(current);
        }

        // The provider still reports an open state; keep the trail, keep the
        // status monotone (processing never falls back to pending).
        if new_status == current_status
            || (new_status == TransactionStatus::Pending
                && current_status == TransactionStatus::Processing)
        {
            queries::append_transaction_detail(&mut dbtx, transaction_id, &detail).await?;
            dbtx.commit().await?;
            return queries::get_transaction(&self.pool, transaction_id)
                .await?
                .ok_or_else(|| AppError::Internal("transaction row vanished".to_string()));
        }

        let affected =
            queries::update_transaction_status(&mut dbtx, transaction_id, new_status.as_str(), &detail)
                .await?;
        if affected == 0 {
            // Guarded update found the row already terminal.
            dbtx.rollback().await?;
            return queries::get_transaction(&self.pool, transaction_id)
                .await?
                .ok_or_else(|| AppError::Internal("transaction row vanished".to_string()));
        }

        if new_status == TransactionStatus::Completed && kind == TransactionKind::Deposit {
            let balance = ledger::credit(&mut dbtx, current.user_id, &current.amount).await?;
            queries::append_transaction_detail(
                &mut dbtx,
                transaction_id,
                &json!({
                    "event": "balance_credit",
                    "amount": current.amount.to_string(),
                    "balance_after": balance.to_string(),
                    "at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        }

        // A withdrawal that the provider refused returns the held funds.
        if kind == TransactionKind::Withdraw
            && matches!(
                new_status,
                TransactionStatus::Failed | TransactionStatus::Cancelled
            )
        {
            let balance = ledger::credit(&mut dbtx, current.user_id, &current.amount).await?;
            queries::append_transaction_detail(
                &mut dbtx,
                transaction_id,
                &json!({
                    "event": "balance_refund",
                    "amount": current.amount.to_string(),
                    "balance_after": balance.to_string(),
                    "at": Utc::now().to_rfc3339(),
                }),
            )
            .await?;
        }

        dbtx.commit().await?;

        self.audit
            .record(
                AuditLevel::Info,
                "orchestrator.apply_transition",
                "Transaction status advanced",
                json!({
                    "transaction_id": transaction_id,
                    "from": current_status.as_str(),
                    "to": new_status.as_str(),
                }),
                Some(current.user_id),
            )
            .await;

        queries::get_transaction(&self.pool, transaction_id)
            .await?
            .ok_or_else(|| AppError::Internal("transaction row vanished".to_string()))
    }

    async fn report_gateway_failure(
        &self,
        source: &str,
        tx: &Transaction,
        url: &str,
        error: &str,
    ) {
        tracing::error!(
            transaction_id = %tx.id,
            gateway_id = %tx.gateway_id,
            url = url,
            error = error,
            "Gateway call failed; transaction rolled back"
        );
        self.audit
            .record(
                AuditLevel::Error,
                &format!("orchestrator.{}", source),
                "Gateway call failed; transaction rolled back",
                json!({
                    "transaction_id": tx.id,
                    "gateway_id": tx.gateway_id,
                    "url": url,
                    "error": error,
                }),
                Some(tx.user_id),
            )
            .await;
    }
}
