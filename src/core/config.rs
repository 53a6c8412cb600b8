

use std::path::PathBuf;
use std::time::Duration;

use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::Result;


pub const ENV_PREFIX: &str = "POSTBOARD";


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    Json,
    Sqlite,
}


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenMode {
    Opaque,
    Signed,
}


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostboardConfig {

    pub host: String,
    pub port: u16,


    pub data_dir: PathBuf,
    pub storage_backend: StorageBackendKind,


    pub pending_ttl_ms: u64,


    pub rate_limit_max: u32,


    pub token_mode: TokenMode,
    pub signing_secret: Option<String>,
    pub signed_token_ttl_secs: i64,
}

impl PostboardConfig {

    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::DEFAULT_PORT,

            data_dir: data_dir.into(),
            storage_backend: StorageBackendKind::Json,

            pending_ttl_ms: crate::DEFAULT_GRACE_PERIOD_MS,

            rate_limit_max: crate::DEFAULT_RATE_LIMIT_PER_MINUTE,

            token_mode: TokenMode::Opaque,
            signing_secret: None,
            signed_token_ttl_secs: 7 * 24 * 60 * 60,
        }
    }

    /// Defaults overlaid with `POSTBOARD_*` environment variables.
    pub fn load() -> Result<Self> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }


    pub fn from_environment(env: Environment) -> Result<Self> {
        let defaults = Self::default();

        let config: Self = Config::builder()
            .set_default("host", defaults.host.clone())?
            .set_default("port", i64::from(defaults.port))?
            .set_default("data_dir", defaults.data_dir.to_string_lossy().to_string())?
            .set_default("storage_backend", "json")?
            .set_default("pending_ttl_ms", defaults.pending_ttl_ms as i64)?
            .set_default("rate_limit_max", i64::from(defaults.rate_limit_max))?
            .set_default("token_mode", "opaque")?
            .set_default("signed_token_ttl_secs", defaults.signed_token_ttl_secs)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        info!(
            "Loaded config: backend={:?}, grace={}ms, token_mode={:?}",
            config.storage_backend,
            config.pending_ttl_ms,
            config.effective_token_mode()
        );
        Ok(config)
    }


    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }


    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.pending_ttl_ms)
    }

    /// A configured signing secret selects signed mode regardless of `token_mode`.
    pub fn effective_token_mode(&self) -> TokenMode {
        if self.signing_secret.as_deref().is_some_and(|s| !s.is_empty()) {
            TokenMode::Signed
        } else {
            self.token_mode
        }
    }


    pub fn signing_key(&self) -> Option<Vec<u8>> {
        match self.effective_token_mode() {
            TokenMode::Opaque => None,
            TokenMode::Signed => match self.signing_secret.as_deref() {
                Some(secret) if !secret.is_empty() => Some(secret.as_bytes().to_vec()),
                _ => {
                    warn!("Signed tokens requested without a secret, generating a per-process key");
                    Some(rand::random::<[u8; 32]>().to_vec())
                }
            },
        }
    }
}

impl Default for PostboardConfig {
    fn default() -> Self {
        Self::new("data")
    }
}
