use std::collections::HashMap;
use std::env;
use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use vaultrs::auth::approle;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::kv2;

use crate::config::Config;
use crate::db::models::Gateway;

const NONCE_LEN: usize = 12;

/// 32-byte key for gateway credential encryption. Debug output never reveals
/// the key material.
#[derive(Clone)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let bytes = hex::decode(hex_str.trim()).context("master key is not valid hex")?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow::anyhow!("master key must be exactly 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(****)")
    }
}

/// Encrypt-on-write half of the credential boundary. Output is
/// base64(nonce || ciphertext); a fresh nonce is drawn per call.
pub fn encrypt_credential(key: &MasterKey, plaintext: &str) -> Result<String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| anyhow::anyhow!("credential encryption failed"))?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);

    Ok(BASE64.encode(combined))
}

/// Decrypt-on-read half of the boundary. Fails on truncated input, on a
/// tampered ciphertext, and on a key mismatch.
pub fn decrypt_credential(key: &MasterKey, encoded: &str) -> Result<String> {
    let combined = BASE64
        .decode(encoded.trim())
        .context("stored credential is not valid base64")?;

    if combined.len() <= NONCE_LEN {
        anyhow::bail!("stored credential is truncated");
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key.0));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| anyhow::anyhow!("credential decryption failed"))?;

    String::from_utf8(plaintext).context("decrypted credential is not valid UTF-8")
}

/// Decrypted credentials for one gateway. Lives only for the duration of one
/// orchestrator operation; Debug output is redacted.
pub struct GatewayCredentials {
    pub public_key: String,
    pub secret_key: String,
    pub webhook_secret: String,
}

impl fmt::Debug for GatewayCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayCredentials")
            .field("public_key", &"****")
            .field("secret_key", &"****")
            .field("webhook_secret", &"****")
            .finish()
    }
}

pub fn decrypt_gateway_credentials(key: &MasterKey, gateway: &Gateway) -> Result<GatewayCredentials> {
    Ok(GatewayCredentials {
        public_key: decrypt_credential(key, &gateway.public_key_enc)
            .context("gateway public key")?,
        secret_key: decrypt_credential(key, &gateway.secret_key_enc)
            .context("gateway secret key")?,
        webhook_secret: decrypt_credential(key, &gateway.webhook_secret_enc)
            .context("gateway webhook secret")?,
    })
}

pub struct SecretsManager {
    client: VaultClient,
    kv_mount: String,
}

impl SecretsManager {
    pub async fn new() -> Result<Self> {
        let vault_addr =
            env::var("VAULT_ADDR").unwrap_or_else(|_| "http://127.0.0.1:8200".to_string());
        let role_id = env::var("VAULT_ROLE_ID").context("VAULT_ROLE_ID is required")?;
        let secret_id = env::var("VAULT_SECRET_ID").context("VAULT_SECRET_ID is required")?;
        let auth_mount = env::var("VAULT_AUTH_MOUNT").unwrap_or_else(|_| "auth/approle".to_string());
        let kv_mount = env::var("VAULT_KV_MOUNT").unwrap_or_else(|_| "secret".to_string());

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(&vault_addr)
                .build()
                .context("failed to build Vault client settings")?,
        )
        .context("failed to create Vault client")?;

        let auth = approle::login(&mut client, &auth_mount, &role_id, &secret_id)
            .await
            .context("failed to authenticate to Vault with AppRole")?;
        client.set_token(&auth.client_token);

        Ok(Self { client, kv_mount })
    }

    pub async fn get_master_key(&self) -> Result<MasterKey> {
        let secret: HashMap<String, String> = kv2::read(&self.client, &self.kv_mount, "paygate")
            .await
            .context("failed to read secret/paygate from Vault")?;

        let hex_key = secret
            .get("master_key")
            .context("master_key not found in Vault secret/paygate")?;

        MasterKey::from_hex(hex_key)
    }
}

/// Startup key resolution: MASTER_KEY_HEX wins (local development), otherwise
/// the key comes from Vault.
pub async fn resolve_master_key(config: &Config) -> Result<MasterKey> {
    if let Some(hex_key) = &config.master_key_hex {
        return MasterKey::from_hex(hex_key);
    }

    let manager = SecretsManager::new().await?;
    manager.get_master_key().await
}
