//! Cross-provider adapter contract tests: every adapter must expose the same
//! capability set and fail safe on status vocabularies it does not know.

use bigdecimal::BigDecimal;
use serde_json::json;
use std::str::FromStr;
use uuid::Uuid;

use paygate_core::db::models::{PaymentMethod, TransactionStatus};
use paygate_core::gateway::{adapter_for, DepositContext, StatusContext};
use paygate_core::secrets::GatewayCredentials;

const PROVIDERS: &[&str] = &["voltpay", "nortepay"];

fn credentials() -> GatewayCredentials {
    GatewayCredentials {
        public_key: "pk_test_public".to_string(),
        secret_key: "sk_test_secret".to_string(),
        webhook_secret: "whsec_test".to_string(),
    }
}

#[test]
fn every_provider_resolves_to_an_adapter() {
    for name in PROVIDERS {
        let adapter = adapter_for(name).expect("registered provider");
        assert_eq!(adapter.name(), *name);
    }
}

#[test]
fn unknown_provider_has_no_adapter() {
    assert!(adapter_for("legacypay").is_none());
    assert!(adapter_for("").is_none());
}

#[test]
fn unknown_status_never_maps_to_completed() {
    let junk_payloads = [
        json!({}),
        json!({ "status": "TOTALLY_NEW_STATE" }),
        json!({ "status": 42 }),
        json!({ "status": null }),
        json!({ "other_field": "PAID" }),
    ];

    for name in PROVIDERS {
        let adapter = adapter_for(name).unwrap();
        for payload in &junk_payloads {
            assert_eq!(
                adapter.map_status(payload),
                TransactionStatus::Pending,
                "{} must fail safe on {:?}",
                name,
                payload
            );
        }
    }
}

#[test]
fn deposit_requests_point_at_the_configured_endpoint() {
    let amount = BigDecimal::from_str("25.00").unwrap();
    let creds = credentials();

    for name in PROVIDERS {
        let adapter = adapter_for(name).unwrap();
        let request = adapter
            .build_deposit_request(&DepositContext {
                endpoint: "https://provider.example",
                credentials: &creds,
                transaction_id: Uuid::new_v4(),
                amount: &amount,
                method: PaymentMethod::Pix,
            })
            .unwrap();

        assert!(
            request.url.starts_with("https://provider.example/"),
            "{} built {}",
            name,
            request.url
        );
    }
}

#[test]
fn secrets_never_leak_into_urls_or_bodies() {
    let amount = BigDecimal::from_str("25.00").unwrap();
    let creds = credentials();

    for name in PROVIDERS {
        let adapter = adapter_for(name).unwrap();

        let deposit = adapter
            .build_deposit_request(&DepositContext {
                endpoint: "https://provider.example",
                credentials: &creds,
                transaction_id: Uuid::new_v4(),
                amount: &amount,
                method: PaymentMethod::Pix,
            })
            .unwrap();

        assert!(!deposit.url.contains("sk_test_secret"));
        if let Some(body) = &deposit.body {
            assert!(!body.to_string().contains("sk_test_secret"));
        }

        let status = adapter
            .build_status_request(&StatusContext {
                endpoint: "https://provider.example",
                credentials: &creds,
                gateway_reference: "ref-1",
            })
            .unwrap();

        assert!(!status.url.contains("sk_test_secret"));
    }
}

#[test]
fn status_requests_embed_the_gateway_reference() {
    let creds = credentials();

    for name in PROVIDERS {
        let adapter = adapter_for(name).unwrap();
        let request = adapter
            .build_status_request(&StatusContext {
                endpoint: "https://provider.example/",
                credentials: &creds,
                gateway_reference: "ref-abc-123",
            })
            .unwrap();

        assert!(request.url.contains("ref-abc-123"));
        assert!(request.body.is_none());
    }
}
