use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Direction of a transaction relative to the user's balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Pix,
    Card,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::Card => "card",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pix" => Ok(PaymentMethod::Pix),
            "card" => Ok(PaymentMethod::Card),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transaction. Advances monotonically; the three
/// terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Processing => "processing",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Completed
                | TransactionStatus::Failed
                | TransactionStatus::Cancelled
        )
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "processing" => Ok(TransactionStatus::Processing),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount: BigDecimal,
    pub payment_method: String,
    pub gateway_id: Uuid,
    pub gateway_transaction_id: Option<String>,
    pub status: String,
    /// Append-only list of lifecycle snapshots (gateway requests/responses,
    /// balance updates). Entries are added, never rewritten.
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user_id: Uuid,
        kind: TransactionKind,
        amount: BigDecimal,
        payment_method: PaymentMethod,
        gateway_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind: kind.as_str().to_string(),
            amount,
            payment_method: payment_method.as_str().to_string(),
            gateway_id,
            gateway_transaction_id: None,
            status: TransactionStatus::Pending.as_str().to_string(),
            details: serde_json::Value::Array(Vec::new()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> Result<TransactionKind, String> {
        self.kind.parse()
    }

    pub fn status(&self) -> Result<TransactionStatus, String> {
        self.status.parse()
    }

    pub fn is_terminal(&self) -> bool {
        self.status
            .parse::<TransactionStatus>()
            .map(|s| s.is_terminal())
            .unwrap_or(false)
    }
}

/// Payment-provider configuration row. Credential columns hold ciphertext;
/// plaintext exists only transiently via `secrets::decrypt_credential`.
#[derive(Debug, Clone, FromRow)]
pub struct Gateway {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
    pub api_endpoint: String,
    pub public_key_enc: String,
    pub secret_key_enc: String,
    pub webhook_secret_enc: String,
    pub for_deposit: bool,
    pub for_withdraw: bool,
    pub allow_pix: bool,
    pub allow_card: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Gateway {
    pub fn allows_method(&self, method: PaymentMethod) -> bool {
        match method {
            PaymentMethod::Pix => self.allow_pix,
            PaymentMethod::Card => self.allow_card,
        }
    }

    pub fn supports_kind(&self, kind: TransactionKind) -> bool {
        match kind {
            TransactionKind::Deposit => self.for_deposit,
            TransactionKind::Withdraw => self.for_withdraw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
            AuditLevel::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub level: String,
    pub source: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub related_user_id: Option<Uuid>,
    pub resolved: bool,
    pub resolved_by: Option<Uuid>,
    pub resolution_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Processing,
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>(), Ok(status));
        }
        assert!("paid".parse::<TransactionStatus>().is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(!TransactionStatus::Processing.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn new_transaction_starts_pending_with_empty_details() {
        let tx = Transaction::new(
            Uuid::new_v4(),
            TransactionKind::Deposit,
            BigDecimal::from(50),
            PaymentMethod::Pix,
            Uuid::new_v4(),
        );

        assert_eq!(tx.status, "pending");
        assert!(!tx.is_terminal());
        assert!(tx.gateway_transaction_id.is_none());
        assert_eq!(tx.details, serde_json::json!([]));
    }

    #[test]
    fn gateway_method_and_kind_flags() {
        let gateway = Gateway {
            id: Uuid::new_v4(),
            name: "voltpay".to_string(),
            is_active: true,
            api_endpoint: "https://api.voltpay.test".to_string(),
            public_key_enc: String::new(),
            secret_key_enc: String::new(),
            webhook_secret_enc: String::new(),
            for_deposit: true,
            for_withdraw: false,
            allow_pix: true,
            allow_card: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(gateway.allows_method(PaymentMethod::Pix));
        assert!(!gateway.allows_method(PaymentMethod::Card));
        assert!(gateway.supports_kind(TransactionKind::Deposit));
        assert!(!gateway.supports_kind(TransactionKind::Withdraw));
    }
}
