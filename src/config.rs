//! Startup configuration loaded from the environment.
//!
//! Everything here is resolved once in `main`; a failure to load the trust
//! key or the CA bundle is fatal and the service refuses to start.

use std::fs;
use std::path::{Path, PathBuf};

use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::DecodePublicKey;

use crate::error::{ProviderError, Result};

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";
const DEFAULT_PUBLIC_KEY_PATH: &str = "/run/secrets/webhook_public_key";
const DEFAULT_TEMPLATES_PATH: &str = "/templates/";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub public_key_path: PathBuf,
    pub extra_ca_bundle: Option<PathBuf>,
    pub templates_path: PathBuf,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("BIND_ADDRESS", DEFAULT_BIND_ADDRESS),
            public_key_path: env_or("WEBHOOK_PUBLIC_KEY_PATH", DEFAULT_PUBLIC_KEY_PATH).into(),
            extra_ca_bundle: std::env::var("EXTRA_CA_CERT_FILE").ok().map(PathBuf::from),
            templates_path: env_or("TEMPLATES_PATH", DEFAULT_TEMPLATES_PATH).into(),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Load the webhook trust key. The file holds an Ed25519 public key in SPKI
/// form, PEM encoded; raw DER is accepted as well.
pub fn load_public_key(path: &Path) -> Result<VerifyingKey> {
    let raw = fs::read(path).map_err(|e| {
        ProviderError::ConfigError(format!("Failed to read '{}': {}", path.display(), e))
    })?;

    if let Ok(text) = std::str::from_utf8(&raw) {
        if text.contains("-----BEGIN") {
            return VerifyingKey::from_public_key_pem(text).map_err(|e| {
                ProviderError::ConfigError(format!(
                    "Failed to parse public key file '{}': {}",
                    path.display(),
                    e
                ))
            });
        }
    }

    VerifyingKey::from_public_key_der(&raw).map_err(|e| {
        ProviderError::ConfigError(format!(
            "Failed to parse public key file '{}': {}",
            path.display(),
            e
        ))
    })
}

/// The CA bundle is handed to git by path; reading it up front surfaces a
/// missing or unreadable file at startup instead of on the first request.
pub fn validate_ca_bundle(path: &Path) -> Result<()> {
    fs::read(path).map(|_| ()).map_err(|e| {
        ProviderError::ConfigError(format!(
            "Could not read extra CA cert file '{}': {}",
            path.display(),
            e
        ))
    })
}
