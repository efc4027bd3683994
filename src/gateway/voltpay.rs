//! VoltPay adapter. PIX-first provider: JSON bodies, basic auth from the
//! gateway key pair, textual status vocabulary.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::db::models::{PaymentMethod, TransactionStatus};
use crate::error::AppError;

use super::{
    AdapterRequest, DepositContext, GatewayAdapter, HttpMethod, PaymentArtifacts, StatusContext,
    WithdrawContext,
};

pub struct VoltPayAdapter;

impl VoltPayAdapter {
    fn auth_header(public_key: &str, secret_key: &str) -> (String, String) {
        let token = BASE64.encode(format!("{}:{}", public_key, secret_key));
        ("authorization".to_string(), format!("Basic {}", token))
    }

    fn base_url(endpoint: &str) -> String {
        endpoint.trim_end_matches('/').to_string()
    }
}

impl GatewayAdapter for VoltPayAdapter {
    fn name(&self) -> &'static str {
        "voltpay"
    }

    fn build_deposit_request(&self, ctx: &DepositContext<'_>) -> Result<AdapterRequest, AppError> {
        let body = serde_json::json!({
            "external_id": ctx.transaction_id.to_string(),
            "amount": ctx.amount.with_scale(2).to_string(),
            "payment_method": ctx.method.as_str(),
        });

        Ok(AdapterRequest {
            method: HttpMethod::Post,
            url: format!("{}/v1/transactions", Self::base_url(ctx.endpoint)),
            headers: vec![Self::auth_header(
                &ctx.credentials.public_key,
                &ctx.credentials.secret_key,
            )],
            body: Some(body),
        })
    }

    fn build_withdraw_request(
        &self,
        ctx: &WithdrawContext<'_>,
    ) -> Result<AdapterRequest, AppError> {
        // VoltPay pays out over PIX only.
        if ctx.method != PaymentMethod::Pix {
            return Err(AppError::UnsupportedPaymentMethod(
                ctx.method.as_str().to_string(),
            ));
        }

        let pix_key = ctx
            .destination
            .pix_key
            .as_deref()
            .ok_or_else(|| AppError::Validation("pix_key is required".to_string()))?;

        let body = serde_json::json!({
            "external_id": ctx.transaction_id.to_string(),
            "amount": ctx.amount.with_scale(2).to_string(),
            "pix_key": pix_key,
            "pix_key_type": ctx.destination.pix_key_type.as_deref().unwrap_or("random"),
        });

        Ok(AdapterRequest {
            method: HttpMethod::Post,
            url: format!("{}/v1/transfers", Self::base_url(ctx.endpoint)),
            headers: vec![Self::auth_header(
                &ctx.credentials.public_key,
                &ctx.credentials.secret_key,
            )],
            body: Some(body),
        })
    }

    fn build_status_request(&self, ctx: &StatusContext<'_>) -> Result<AdapterRequest, AppError> {
        Ok(AdapterRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}/v1/transactions/{}",
                Self::base_url(ctx.endpoint),
                ctx.gateway_reference
            ),
            headers: vec![Self::auth_header(
                &ctx.credentials.public_key,
                &ctx.credentials.secret_key,
            )],
            body: None,
        })
    }

    fn map_status(&self, payload: &serde_json::Value) -> TransactionStatus {
        let raw = payload["status"].as_str().unwrap_or_default();

        match raw.to_ascii_uppercase().as_str() {
            "PAID" | "COMPLETED" | "APPROVED" => TransactionStatus::Completed,
            "PROCESSING" | "IN_PROCESS" => TransactionStatus::Processing,
            "REFUSED" | "FAILED" | "ERROR" => TransactionStatus::Failed,
            "CANCELED" | "CANCELLED" | "REFUNDED" | "CHARGEBACK" => TransactionStatus::Cancelled,
            // "PENDING", "CREATED" and anything VoltPay adds later.
            _ => TransactionStatus::Pending,
        }
    }

    fn extract_reference(&self, payload: &serde_json::Value) -> Option<String> {
        payload["id"]
            .as_str()
            .or_else(|| payload["transaction_id"].as_str())
            .map(str::to_string)
    }

    fn extract_artifacts(&self, payload: &serde_json::Value) -> PaymentArtifacts {
        PaymentArtifacts {
            qr_code_url: payload["qrcode"]["image_url"]
                .as_str()
                .or_else(|| payload["qr_code_url"].as_str())
                .map(str::to_string),
            pix_code: payload["qrcode"]["payload"]
                .as_str()
                .or_else(|| payload["pix_code"].as_str())
                .map(str::to_string),
            redirect_url: payload["checkout_url"].as_str().map(str::to_string),
        }
    }
}
