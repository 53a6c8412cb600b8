

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::opaque::OpaqueTokenRegistry;
use super::signed::SignedTokenRegistry;
use crate::core::config::{PostboardConfig, TokenMode};
use crate::core::error::Result;
use crate::storage::models::UserId;
use crate::storage::persistence::StatePersistence;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub user_id: UserId,
}


/// Session tokens, opaque or signed, behind one interface.
///
/// Signed tokens cannot be revoked individually: `revoke_all` returns an empty
/// set for them and they stay valid until they expire.
pub trait TokenRegistry: Send + Sync {

    fn issue(&self, user_id: UserId) -> Result<String>;


    fn resolve(&self, token: &str) -> Result<UserId>;


    fn revoke_all(&self, user_id: UserId) -> Vec<String>;


    fn restore(&self, tokens: &[String], user_id: UserId);


    fn mode(&self) -> TokenMode;
}


pub struct TokenRegistryFactory;

impl TokenRegistryFactory {

    pub fn from_config(
        config: &PostboardConfig,
        persistence: Arc<StatePersistence>,
    ) -> Arc<dyn TokenRegistry> {
        match config.signing_key() {
            Some(key) => {
                info!("Using signed session tokens");
                Arc::new(SignedTokenRegistry::new(key, config.signed_token_ttl_secs))
            }
            None => {
                let registry = OpaqueTokenRegistry::load(persistence);
                info!("Using opaque session tokens ({} restored)", registry.len());
                Arc::new(registry)
            }
        }
    }
}
