use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use super::{AdapterRequest, HttpMethod};

const BODY_SNIPPET_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum GatewayHttpError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Provider returned {status}: {body}")]
    ErrorStatus { status: u16, body: String },
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// HTTP client for outbound provider calls. Every call carries the configured
/// timeout; consecutive failures open the circuit breaker so a dead provider
/// does not tie up request handlers.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl GatewayHttpClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(60), Duration::from_secs(120));
        let policy = failure_policy::consecutive_failures(3, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayHttpClient {
            client,
            circuit_breaker,
        }
    }

    pub fn with_circuit_breaker(
        timeout_secs: u64,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        GatewayHttpClient {
            client,
            circuit_breaker,
        }
    }

    pub fn circuit_state(&self) -> &'static str {
        if self.circuit_breaker.is_call_permitted() {
            "closed"
        } else {
            "open"
        }
    }

    /// Executes a prepared adapter request and parses the JSON body. Non-2xx
    /// responses and malformed bodies are errors; the caller decides whether
    /// they are fatal for the operation at hand.
    pub async fn execute(
        &self,
        request: AdapterRequest,
    ) -> Result<serde_json::Value, GatewayHttpError> {
        let client = self.client.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let mut builder = match request.method {
                    HttpMethod::Get => client.get(&request.url),
                    HttpMethod::Post => client.post(&request.url),
                };

                for (name, value) in &request.headers {
                    builder = builder.header(name, value);
                }

                if let Some(body) = &request.body {
                    builder = builder.json(body);
                }

                let response = builder.send().await?;
                let status = response.status();
                let text = response.text().await?;

                if !status.is_success() {
                    let mut body = text;
                    body.truncate(BODY_SNIPPET_LEN);
                    return Err(GatewayHttpError::ErrorStatus {
                        status: status.as_u16(),
                        body,
                    });
                }

                serde_json::from_str(&text)
                    .map_err(|e| GatewayHttpError::InvalidResponse(e.to_string()))
            })
            .await;

        match result {
            Ok(value) => Ok(value),
            Err(FailsafeError::Rejected) => Err(GatewayHttpError::CircuitBreakerOpen(
                "provider circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_creation() {
        let client = GatewayHttpClient::new(30);
        assert_eq!(client.circuit_state(), "closed");
    }

    #[tokio::test]
    async fn test_execute_post_with_json_body() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/transactions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"ref-42","status":"PENDING"}"#)
            .create_async()
            .await;

        let client = GatewayHttpClient::new(5);
        let response = client
            .execute(AdapterRequest {
                method: HttpMethod::Post,
                url: format!("{}/v1/transactions", server.url()),
                headers: vec![("authorization".to_string(), "Basic abc".to_string())],
                body: Some(json!({"external_id": "tx-1", "amount": "50.00"})),
            })
            .await
            .unwrap();

        assert_eq!(response["id"], "ref-42");
    }

    #[tokio::test]
    async fn test_execute_maps_error_status() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/v1/transactions/ref-1")
            .with_status(500)
            .with_body("internal error")
            .create_async()
            .await;

        let client = GatewayHttpClient::new(5);
        let result = client
            .execute(AdapterRequest {
                method: HttpMethod::Get,
                url: format!("{}/v1/transactions/ref-1", server.url()),
                headers: vec![],
                body: None,
            })
            .await;

        assert!(matches!(
            result,
            Err(GatewayHttpError::ErrorStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_execute_rejects_non_json_body() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/v1/ping")
            .with_status(200)
            .with_body("pong")
            .create_async()
            .await;

        let client = GatewayHttpClient::new(5);
        let result = client
            .execute(AdapterRequest {
                method: HttpMethod::Get,
                url: format!("{}/v1/ping", server.url()),
                headers: vec![],
                body: None,
            })
            .await;

        assert!(matches!(result, Err(GatewayHttpError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_failures() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("GET", "/v1/down")
            .with_status(500)
            .expect_at_least(3)
            .create_async()
            .await;

        let client = GatewayHttpClient::with_circuit_breaker(5, 3, 60);
        let request = |url: String| AdapterRequest {
            method: HttpMethod::Get,
            url,
            headers: vec![],
            body: None,
        };

        for _ in 0..3 {
            let _ = client
                .execute(request(format!("{}/v1/down", server.url())))
                .await;
        }

        let result = client
            .execute(request(format!("{}/v1/down", server.url())))
            .await;
        assert!(matches!(result, Err(GatewayHttpError::CircuitBreakerOpen(_))));
    }
}
