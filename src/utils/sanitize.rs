use serde_json::Value;

/// Masks sensitive fields in JSON payloads before they reach a log line or a
/// stored `details` snapshot.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "password"
            | "secret"
            | "secret_key"
            | "public_key"
            | "webhook_secret"
            | "token"
            | "api_key"
            | "authorization"
            | "pix_key"
            | "account_number"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > 8 => {
            // Keep a hint of the value for correlation. Slices fall back to a
            // full mask when they would split a multi-byte character.
            match (s.get(..4), s.get(s.len() - 4..)) {
                (Some(start), Some(end)) => Value::String(format!("{}****{}", start, end)),
                _ => Value::String("****".to_string()),
            }
        }
        _ => Value::String("****".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_pix_key() {
        let input = json!({
            "pix_key": "ana.souza@example.com",
            "amount": "100.00"
        });

        let sanitized = sanitize_json(&input);
        let pix_key = sanitized["pix_key"].as_str().unwrap();

        assert!(pix_key.contains("****"));
        assert!(!pix_key.contains("souza"));
        assert_eq!(sanitized["amount"], "100.00");
    }

    #[test]
    fn test_sanitize_nested() {
        let input = json!({
            "gateway": {
                "secret_key": "sk_live_1234567890",
                "name": "voltpay"
            }
        });

        let sanitized = sanitize_json(&input);
        assert!(sanitized["gateway"]["secret_key"]
            .as_str()
            .unwrap()
            .contains("****"));
        assert_eq!(sanitized["gateway"]["name"], "voltpay");
    }

    #[test]
    fn test_short_values_fully_masked() {
        let input = json!({ "token": "abc" });
        assert_eq!(sanitize_json(&input)["token"], "****");
    }

    #[test]
    fn test_arrays_are_walked() {
        let input = json!([{ "api_key": "key_12345678901" }, { "plain": 1 }]);
        let sanitized = sanitize_json(&input);

        assert!(sanitized[0]["api_key"].as_str().unwrap().contains("****"));
        assert_eq!(sanitized[1]["plain"], 1);
    }
}
