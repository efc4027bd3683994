//! Payment-provider adapters. All provider-specific knowledge (URLs, payload
//! shapes, auth headers, status vocabularies) lives behind `GatewayAdapter`;
//! the orchestrator only ever sees the uniform capability set.

use bigdecimal::BigDecimal;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::{PaymentMethod, TransactionStatus};
use crate::error::AppError;
use crate::secrets::GatewayCredentials;

pub mod client;
mod nortepay;
mod voltpay;

pub use client::{GatewayHttpClient, GatewayHttpError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully prepared provider call: URL, auth headers and body, ready for the
/// HTTP client. Built by an adapter, never assembled in the orchestrator.
#[derive(Debug)]
pub struct AdapterRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

/// Checkout artifacts a provider returns for a freshly created deposit.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct PaymentArtifacts {
    pub qr_code_url: Option<String>,
    pub pix_code: Option<String>,
    pub redirect_url: Option<String>,
}

/// Where a withdrawal should be paid out. Which fields are required depends
/// on the payment method; adapters validate their own subset.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawDestination {
    pub pix_key: Option<String>,
    pub pix_key_type: Option<String>,
    pub account_holder: Option<String>,
    pub bank_code: Option<String>,
    pub branch: Option<String>,
    pub account_number: Option<String>,
}

pub struct DepositContext<'a> {
    pub endpoint: &'a str,
    pub credentials: &'a GatewayCredentials,
    pub transaction_id: Uuid,
    pub amount: &'a BigDecimal,
    pub method: PaymentMethod,
}

pub struct WithdrawContext<'a> {
    pub endpoint: &'a str,
    pub credentials: &'a GatewayCredentials,
    pub transaction_id: Uuid,
    pub amount: &'a BigDecimal,
    pub method: PaymentMethod,
    pub destination: &'a WithdrawDestination,
}

pub struct StatusContext<'a> {
    pub endpoint: &'a str,
    pub credentials: &'a GatewayCredentials,
    pub gateway_reference: &'a str,
}

/// Uniform provider capability set. One implementation per provider,
/// selected by the gateway row's `name`.
pub trait GatewayAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    fn build_deposit_request(&self, ctx: &DepositContext<'_>) -> Result<AdapterRequest, AppError>;

    fn build_withdraw_request(&self, ctx: &WithdrawContext<'_>) -> Result<AdapterRequest, AppError>;

    fn build_status_request(&self, ctx: &StatusContext<'_>) -> Result<AdapterRequest, AppError>;

    /// Translates the provider's status vocabulary into the internal enum.
    /// Unknown values map to `Pending` — a payload we cannot read must never
    /// mark a transaction completed.
    fn map_status(&self, payload: &serde_json::Value) -> TransactionStatus;

    /// The provider's own transaction id, from a create response or a
    /// webhook payload.
    fn extract_reference(&self, payload: &serde_json::Value) -> Option<String>;

    fn extract_artifacts(&self, payload: &serde_json::Value) -> PaymentArtifacts;
}

static VOLTPAY: voltpay::VoltPayAdapter = voltpay::VoltPayAdapter;
static NORTEPAY: nortepay::NortePayAdapter = nortepay::NortePayAdapter;

pub fn adapter_for(gateway_name: &str) -> Option<&'static dyn GatewayAdapter> {
    match gateway_name {
        "voltpay" => Some(&VOLTPAY),
        "nortepay" => Some(&NORTEPAY),
        _ => None,
    }
}

/// Constant-time HMAC-SHA256 check over the raw webhook body. The signature
/// header carries the hex digest.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Hex HMAC-SHA256 digest of a payload. Used by tests and by operators
/// replaying webhooks against a sandbox.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_resolve() {
        assert_eq!(adapter_for("voltpay").unwrap().name(), "voltpay");
        assert_eq!(adapter_for("nortepay").unwrap().name(), "nortepay");
        assert!(adapter_for("acme").is_none());
    }

    #[test]
    fn signature_round_trip() {
        let body = br#"{"id":"ref-1","status":"PAID"}"#;
        let signature = sign_payload("whsec_test", body);

        assert!(verify_webhook_signature("whsec_test", body, &signature));
    }

    #[test]
    fn signature_rejects_wrong_secret() {
        let body = br#"{"id":"ref-1","status":"PAID"}"#;
        let signature = sign_payload("whsec_test", body);

        assert!(!verify_webhook_signature("whsec_other", body, &signature));
    }

    #[test]
    fn signature_rejects_modified_body() {
        let signature = sign_payload("whsec_test", br#"{"id":"ref-1","status":"PAID"}"#);

        assert!(!verify_webhook_signature(
            "whsec_test",
            br#"{"id":"ref-2","status":"PAID"}"#,
            &signature
        ));
    }

    #[test]
    fn signature_rejects_garbage_header() {
        assert!(!verify_webhook_signature("whsec_test", b"{}", "zz-not-hex"));
        assert!(!verify_webhook_signature("whsec_test", b"{}", ""));
    }
}
