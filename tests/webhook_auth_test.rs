use hmac::{Hmac, Mac};
use sha2::Sha256;

use paygate_core::gateway::{sign_payload, verify_webhook_signature};

type HmacSha256 = Hmac<Sha256>;

#[test]
fn test_hmac_signature_generation() {
    let signature = sign_payload("whsec_test_key", br#"{"id":"volt-1","status":"PAID"}"#);

    // SHA256 produces 32 bytes = 64 hex chars
    assert_eq!(signature.len(), 64);
    assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_signature_matches_reference_hmac() {
    let secret = "whsec_test_key";
    let payload = br#"{"id":"volt-1","status":"PAID"}"#;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    assert_eq!(sign_payload(secret, payload), expected);
}

#[test]
fn test_signature_verification_round_trip() {
    let secret = "whsec_test_key";
    let payload = br#"{"id":"volt-1","status":"PAID"}"#;

    let signature = sign_payload(secret, payload);
    assert!(verify_webhook_signature(secret, payload, &signature));
}

#[test]
fn test_signature_mismatch_on_altered_payload() {
    let secret = "whsec_test_key";
    let signature = sign_payload(secret, br#"{"id":"volt-1","status":"PAID"}"#);

    assert!(!verify_webhook_signature(
        secret,
        br#"{"id":"volt-1","status":"REFUSED"}"#,
        &signature
    ));
}

#[test]
fn test_signature_mismatch_on_wrong_secret() {
    let payload = br#"{"id":"volt-1","status":"PAID"}"#;
    let signature = sign_payload("whsec_test_key", payload);

    assert!(!verify_webhook_signature("whsec_rotated", payload, &signature));
}

#[test]
fn test_malformed_signature_header_is_rejected() {
    let payload = br#"{"id":"volt-1","status":"PAID"}"#;

    assert!(!verify_webhook_signature("whsec_test_key", payload, ""));
    assert!(!verify_webhook_signature("whsec_test_key", payload, "not-hex"));
    assert!(!verify_webhook_signature("whsec_test_key", payload, "abcd"));
}
