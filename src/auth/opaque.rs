use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::registry::{TokenRecord, TokenRegistry};
use crate::core::config::TokenMode;
use crate::core::error::{PostboardError, Result};
use crate::storage::models::UserId;
use crate::storage::persistence::StatePersistence;


const TOKEN_BYTES: usize = 24;


/// Server-side token table, persisted after every change.
pub struct OpaqueTokenRegistry {
    tokens: RwLock<BTreeMap<String, TokenRecord>>,
    persistence: Arc<StatePersistence>,
    persist_lock: Mutex<()>,
}

impl OpaqueTokenRegistry {
    pub fn load(persistence: Arc<StatePersistence>) -> Self {
        let tokens = persistence.load_tokens();
        Self {
            tokens: RwLock::new(tokens),
            persistence,
            persist_lock: Mutex::new(()),
        }
    }


    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.read().is_empty()
    }


    fn persist(&self) -> bool {
        let _serial = self.persist_lock.lock();
        let all = self.tokens.read().clone();
        self.persistence.save_tokens(&all)
    }

    fn generate() -> String {
        hex::encode(rand::random::<[u8; TOKEN_BYTES]>())
    }
}

impl TokenRegistry for OpaqueTokenRegistry {
    fn issue(&self, user_id: UserId) -> Result<String> {
        let token = {
            let mut tokens = self.tokens.write();
            let mut token = Self::generate();
            while tokens.contains_key(&token) {
                token = Self::generate();
            }
            tokens.insert(token.clone(), TokenRecord { user_id });
            token
        };
        self.persist();
        debug!("Issued opaque token for user {}", user_id);
        Ok(token)
    }

    fn resolve(&self, token: &str) -> Result<UserId> {
        self.tokens
            .read()
            .get(token)
            .map(|record| record.user_id)
            .ok_or(PostboardError::InvalidToken)
    }

    fn revoke_all(&self, user_id: UserId) -> Vec<String> {
        let revoked: Vec<String> = {
            let mut tokens = self.tokens.write();
            let revoked: Vec<String> = tokens
                .iter()
                .filter(|(_, record)| record.user_id == user_id)
                .map(|(token, _)| token.clone())
                .collect();
            for token in &revoked {
                tokens.remove(token);
            }
            revoked
        };

        if !revoked.is_empty() {
            self.persist();
        }
        debug!("Revoked {} tokens of user {}", revoked.len(), user_id);
        revoked
    }

    fn restore(&self, tokens: &[String], user_id: UserId) {
        if tokens.is_empty() {
            return;
        }
        {
            let mut table = self.tokens.write();
            for token in tokens {
                table.insert(token.clone(), TokenRecord { user_id });
            }
        }
        self.persist();
        debug!("Restored {} tokens of user {}", tokens.len(), user_id);
    }

    fn mode(&self) -> TokenMode {
        TokenMode::Opaque
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn registry() -> OpaqueTokenRegistry {
        OpaqueTokenRegistry::load(Arc::new(StatePersistence::in_memory().unwrap()))
    }

    #[test]
    fn test_issue_and_resolve() {
        let registry = registry();
        let token = registry.issue(7).unwrap();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert_eq!(registry.resolve(&token).unwrap(), 7);
        assert_err!(registry.resolve("nope"));
    }

    #[test]
    fn test_revoke_all_only_touches_one_user() {
        let registry = registry();
        let a1 = registry.issue(1).unwrap();
        let a2 = registry.issue(1).unwrap();
        let b = registry.issue(2).unwrap();

        let mut revoked = registry.revoke_all(1);
        revoked.sort();
        let mut expected = vec![a1.clone(), a2.clone()];
        expected.sort();
        assert_eq!(revoked, expected);

        assert_err!(registry.resolve(&a1));
        assert_err!(registry.resolve(&a2));
        assert_ok!(registry.resolve(&b));
    }

    #[test]
    fn test_restore_rebinds_same_values() {
        let registry = registry();
        let token = registry.issue(3).unwrap();
        let revoked = registry.revoke_all(3);
        assert_err!(registry.resolve(&token));

        registry.restore(&revoked, 3);
        assert_eq!(registry.resolve(&token).unwrap(), 3);
    }

    #[test]
    fn test_tokens_survive_reload() {
        let persistence = Arc::new(StatePersistence::in_memory().unwrap());
        let token = OpaqueTokenRegistry::load(Arc::clone(&persistence))
            .issue(9)
            .unwrap();

        let reloaded = OpaqueTokenRegistry::load(persistence);
        assert_eq!(reloaded.resolve(&token).unwrap(), 9);
    }
}
