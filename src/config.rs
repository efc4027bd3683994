use dotenvy::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    /// Bound on every outbound call to a payment provider.
    pub gateway_timeout_secs: u64,
    /// Interval of the background reconciliation poller.
    pub poll_interval_secs: u64,
    /// Non-terminal transactions older than this are picked up by the poller.
    pub stale_after_secs: i64,
    /// Hex-encoded 32-byte key for credential encryption. When unset, the key
    /// is fetched from Vault at startup.
    pub master_key_hex: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        Ok(Config {
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            database_url: env::var("DATABASE_URL")?,
            gateway_timeout_secs: env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()?,
            poll_interval_secs: env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()?,
            stale_after_secs: env::var("STALE_AFTER_SECS")
                .unwrap_or_else(|_| "300".to_string())
                .parse()?,
            master_key_hex: env::var("MASTER_KEY_HEX").ok(),
        })
    }
}
