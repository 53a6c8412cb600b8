//! Stateless HS256 tokens (JWT compact form).
//!
//! Nothing is stored server-side, so these tokens cannot be revoked when their
//! user is deleted. They keep resolving until `exp`, including through the
//! grace period and after a purge.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::registry::TokenRegistry;
use crate::core::config::TokenMode;
use crate::core::error::{PostboardError, Result};
use crate::storage::models::UserId;


type HmacSha256 = Hmac<Sha256>;


const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;


#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Claims {
    user_id: UserId,
    iat: i64,
    exp: i64,
}


pub struct SignedTokenRegistry {
    key: Vec<u8>,
    ttl_secs: i64,
}

impl SignedTokenRegistry {
    pub fn new(key: Vec<u8>, ttl_secs: i64) -> Self {
        Self { key, ttl_secs }
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|e| PostboardError::Config(format!("invalid signing key: {e}")))
    }

    fn sign(&self, signing_input: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(signing_input.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }
}

impl TokenRegistry for SignedTokenRegistry {
    fn issue(&self, user_id: UserId) -> Result<String> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            user_id,
            iat,
            exp: iat + self.ttl_secs,
        };

        let header = URL_SAFE_NO_PAD.encode(HEADER);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{header}.{payload}");
        let signature = self.sign(&signing_input)?;
        Ok(format!("{signing_input}.{signature}"))
    }

    fn resolve(&self, token: &str) -> Result<UserId> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PostboardError::InvalidToken);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| PostboardError::InvalidToken)?;
        let mut mac = self.mac()?;
        mac.update(format!("{header}.{payload}").as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| PostboardError::InvalidToken)?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .ok_or(PostboardError::InvalidToken)?;

        if claims.exp <= Utc::now().timestamp() {
            debug!("Signed token for user {} expired", claims.user_id);
            return Err(PostboardError::InvalidToken);
        }
        Ok(claims.user_id)
    }

    fn revoke_all(&self, user_id: UserId) -> Vec<String> {
        debug!("Signed tokens of user {} stay valid until expiry", user_id);
        Vec::new()
    }

    fn restore(&self, _tokens: &[String], _user_id: UserId) {}

    fn mode(&self) -> TokenMode {
        TokenMode::Signed
    }
}
