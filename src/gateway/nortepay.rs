//! NortePay adapter. PIX and card provider: API-key header auth, amounts in
//! integer cents, numeric status codes.

use bigdecimal::{BigDecimal, ToPrimitive};

use crate::db::models::{PaymentMethod, TransactionStatus};
use crate::error::AppError;

use super::{
    AdapterRequest, DepositContext, GatewayAdapter, HttpMethod, PaymentArtifacts, StatusContext,
    WithdrawContext,
};

pub struct NortePayAdapter;

impl NortePayAdapter {
    fn auth_headers(public_key: &str, secret_key: &str) -> Vec<(String, String)> {
        vec![
            ("x-client-id".to_string(), public_key.to_string()),
            ("x-api-key".to_string(), secret_key.to_string()),
        ]
    }

    fn base_url(endpoint: &str) -> String {
        endpoint.trim_end_matches('/').to_string()
    }

    fn amount_cents(amount: &BigDecimal) -> Result<i64, AppError> {
        (amount.with_scale(2) * BigDecimal::from(100))
            .with_scale(0)
            .to_i64()
            .ok_or_else(|| AppError::Validation("amount out of range".to_string()))
    }
}

impl GatewayAdapter for NortePayAdapter {
    fn name(&self) -> &'static str {
        "nortepay"
    }

    fn build_deposit_request(&self, ctx: &DepositContext<'_>) -> Result<AdapterRequest, AppError> {
        let body = serde_json::json!({
            "reference": ctx.transaction_id.to_string(),
            "amount_cents": Self::amount_cents(ctx.amount)?,
            "method": ctx.method.as_str(),
        });

        Ok(AdapterRequest {
            method: HttpMethod::Post,
            url: format!("{}/api/charges", Self::base_url(ctx.endpoint)),
            headers: Self::auth_headers(&ctx.credentials.public_key, &ctx.credentials.secret_key),
            body: Some(body),
        })
    }

    fn build_withdraw_request(
        &self,
        ctx: &WithdrawContext<'_>,
    ) -> Result<AdapterRequest, AppError> {
        let mut body = serde_json::json!({
            "reference": ctx.transaction_id.to_string(),
            "amount_cents": Self::amount_cents(ctx.amount)?,
        });

        match ctx.method {
            PaymentMethod::Pix => {
                let pix_key = ctx
                    .destination
                    .pix_key
                    .as_deref()
                    .ok_or_else(|| AppError::Validation("pix_key is required".to_string()))?;
                body["method"] = "pix".into();
                body["pix_key"] = pix_key.into();
                body["pix_key_type"] = ctx
                    .destination
                    .pix_key_type
                    .as_deref()
                    .unwrap_or("random")
                    .into();
            }
            PaymentMethod::Card => {
                let account_number = ctx.destination.account_number.as_deref().ok_or_else(|| {
                    AppError::Validation("account_number is required".to_string())
                })?;
                let bank_code = ctx
                    .destination
                    .bank_code
                    .as_deref()
                    .ok_or_else(|| AppError::Validation("bank_code is required".to_string()))?;
                body["method"] = "bank_account".into();
                body["account_number"] = account_number.into();
                body["bank_code"] = bank_code.into();
                body["branch"] = ctx.destination.branch.as_deref().unwrap_or_default().into();
                body["account_holder"] = ctx
                    .destination
                    .account_holder
                    .as_deref()
                    .unwrap_or_default()
                    .into();
            }
        }

        Ok(AdapterRequest {
            method: HttpMethod::Post,
            url: format!("{}/api/payouts", Self::base_url(ctx.endpoint)),
            headers: Self::auth_headers(&ctx.credentials.public_key, &ctx.credentials.secret_key),
            body: Some(body),
        })
    }

    fn build_status_request(&self, ctx: &StatusContext<'_>) -> Result<AdapterRequest, AppError> {
        Ok(AdapterRequest {
            method: HttpMethod::Get,
            url: format!(
                "{}/api/charges/{}",
                Self::base_url(ctx.endpoint),
                ctx.gateway_reference
            ),
            headers: Self::auth_headers(&ctx.credentials.public_key, &ctx.credentials.secret_key),
            body: None,
        })
    }

    fn map_status(&self, payload: &serde_json::Value) -> TransactionStatus {
        let code = payload["status"]
            .as_i64()
            .or_else(|| payload["status"].as_str().and_then(|s| s.parse().ok()));

        match code {
            Some(2) => TransactionStatus::Processing,
            Some(3) => TransactionStatus::Completed,
            Some(4) => TransactionStatus::Failed,
            Some(5) => TransactionStatus::Cancelled,
            // 1 is pending; unknown codes stay pending until a human looks.
            _ => TransactionStatus::Pending,
        }
    }

    fn extract_reference(&self, payload: &serde_json::Value) -> Option<String> {
        match &payload["charge_id"] {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn extract_artifacts(&self, payload: &serde_json::Value) -> PaymentArtifacts {
        PaymentArtifacts {
            qr_code_url: payload["pix"]["qr_code_url"].as_str().map(str::to_string),
            pix_code: payload["pix"]["emv"].as_str().map(str::to_string),
            redirect_url: payload["payment_url"].as_str().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::WithdrawDestination;
    use crate::secrets::GatewayCredentials;
    use serde_json::json;
    use std::str::FromStr;
    use uuid::Uuid;

    fn credentials() -> GatewayCredentials {
        GatewayCredentials {
            public_key: "client_test".to_string(),
            secret_key: "key_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
        }
    }

    #[test]
    fn deposit_amount_is_integer_cents() {
        let amount = BigDecimal::from_str("50.25").unwrap();
        let creds = credentials();
        let request = NortePayAdapter
            .build_deposit_request(&DepositContext {
                endpoint: "https://api.nortepay.test",
                credentials: &creds,
                transaction_id: Uuid::new_v4(),
                amount: &amount,
                method: PaymentMethod::Card,
            })
            .unwrap();

        assert_eq!(request.url, "https://api.nortepay.test/api/charges");
        let body = request.body.unwrap();
        assert_eq!(body["amount_cents"], 5025);
        assert_eq!(body["method"], "card");
    }

    #[test]
    fn auth_travels_in_headers() {
        let creds = credentials();
        let request = NortePayAdapter
            .build_status_request(&StatusContext {
                endpoint: "https://api.nortepay.test/",
                credentials: &creds,
                gateway_reference: "ch_99",
            })
            .unwrap();

        assert_eq!(request.url, "https://api.nortepay.test/api/charges/ch_99");
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "x-api-key" && v == "key_test"));
    }

    #[test]
    fn card_withdraw_requires_bank_account() {
        let amount = BigDecimal::from_str("10").unwrap();
        let creds = credentials();
        let destination = WithdrawDestination {
            pix_key: None,
            pix_key_type: None,
            account_holder: Some("Ana Souza".to_string()),
            bank_code: None,
            branch: None,
            account_number: Some("12345-6".to_string()),
        };

        let result = NortePayAdapter.build_withdraw_request(&WithdrawContext {
            endpoint: "https://api.nortepay.test",
            credentials: &creds,
            transaction_id: Uuid::new_v4(),
            amount: &amount,
            method: PaymentMethod::Card,
            destination: &destination,
        });

        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn numeric_status_codes() {
        let map = |v: serde_json::Value| NortePayAdapter.map_status(&json!({ "status": v }));

        assert_eq!(map(json!(1)), TransactionStatus::Pending);
        assert_eq!(map(json!(2)), TransactionStatus::Processing);
        assert_eq!(map(json!(3)), TransactionStatus::Completed);
        assert_eq!(map(json!(4)), TransactionStatus::Failed);
        assert_eq!(map(json!(5)), TransactionStatus::Cancelled);
        assert_eq!(map(json!("3")), TransactionStatus::Completed);
        assert_eq!(map(json!(99)), TransactionStatus::Pending);
        assert_eq!(map(json!("paid")), TransactionStatus::Pending);
    }

    #[test]
    fn reference_accepts_string_or_number() {
        assert_eq!(
            NortePayAdapter
                .extract_reference(&json!({ "charge_id": "ch_7" }))
                .as_deref(),
            Some("ch_7")
        );
        assert_eq!(
            NortePayAdapter
                .extract_reference(&json!({ "charge_id": 7001 }))
                .as_deref(),
            Some("7001")
        );
        assert!(NortePayAdapter.extract_reference(&json!({})).is_none());
    }
}
