

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use super::backend::{SqliteBackend, StateBackend};
use super::models::Record;
use crate::auth::TokenRecord;
use crate::core::error::Result;
use crate::undo::PendingSnapshot;


pub const USERS_KEY: &str = "users";
pub const POSTS_KEY: &str = "posts";
pub const SNAPSHOTS_KEY: &str = "pendingDeletes";
pub const TOKENS_KEY: &str = "authTokens";


/// Durable round-trip of whole collections.
///
/// Reads that fail (missing backend data, corrupt JSON) degrade to an empty
/// collection. Writes that fail are logged and reported as `false`; the
/// in-memory state stays authoritative and the next successful write
/// reconciles storage.
pub struct StatePersistence {
    backend: Box<dyn StateBackend>,
}

impl StatePersistence {
    pub fn new(backend: Box<dyn StateBackend>) -> Self {
        debug!("Persistence backed by {}", backend.backend_name());
        Self { backend }
    }


    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Box::new(SqliteBackend::open_in_memory()?)))
    }


    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }


    pub fn load_document<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let raw = match self.backend.read(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return T::default(),
            Err(e) => {
                warn!("Failed reading '{}', starting empty: {}", key, e);
                return T::default();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!("Corrupt document '{}', starting empty: {}", key, e);
                T::default()
            }
        }
    }


    pub fn save_document<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let document = match serde_json::to_string_pretty(value) {
            Ok(document) => document,
            Err(e) => {
                error!("Failed serializing '{}': {}", key, e);
                return false;
            }
        };

        match self.backend.write(key, &document) {
            Ok(()) => true,
            Err(e) => {
                error!("Failed writing '{}': {}", key, e);
                false
            }
        }
    }


    pub fn load_snapshots(&self) -> BTreeMap<String, PendingSnapshot> {
        self.load_document(SNAPSHOTS_KEY)
    }

    pub fn save_snapshots(&self, all: &BTreeMap<String, PendingSnapshot>) -> bool {
        self.save_document(SNAPSHOTS_KEY, all)
    }


    pub fn load_tokens(&self) -> BTreeMap<String, TokenRecord> {
        self.load_document(TOKENS_KEY)
    }

    pub fn save_tokens(&self, all: &BTreeMap<String, TokenRecord>) -> bool {
        self.save_document(TOKENS_KEY, all)
    }


    pub fn load_records<T: Record>(&self, key: &str) -> Vec<T> {
        self.load_document(key)
    }

    pub fn save_records<T: Record>(&self, key: &str, records: &[T]) -> bool {
        self.save_document(key, records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::backend::JsonFileBackend;
    use crate::storage::models::{PostRecord, UserRecord};
    use crate::undo::SnapshotPayload;
    use chrono::{Duration, Utc};
    use std::fs;

    fn json_persistence(dir: &std::path::Path) -> StatePersistence {
        StatePersistence::new(Box::new(JsonFileBackend::open(dir).unwrap()))
    }

    fn sample_snapshot() -> PendingSnapshot {
        let created_at = Utc::now();
        PendingSnapshot::new(
            "undo_abc".to_string(),
            SnapshotPayload::User {
                user: UserRecord {
                    id: 3,
                    name: "rui".to_string(),
                    admin: false,
                    password_salt: None,
                    password_hash: None,
                },
                posts: vec![PostRecord {
                    id: 9,
                    user_id: 3,
                    content: "ola".to_string(),
                    created_at,
                    updated_at: None,
                }],
            },
            vec!["tok-1".to_string()],
            created_at,
            created_at + Duration::seconds(10),
        )
    }

    #[test]
    fn test_snapshots_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = json_persistence(dir.path());

        let snapshot = sample_snapshot();
        let mut all = BTreeMap::new();
        all.insert(snapshot.undo_handle.clone(), snapshot.clone());
        assert!(persistence.save_snapshots(&all));

        let loaded = persistence.load_snapshots();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["undo_abc"], snapshot);
    }

    #[test]
    fn test_persisted_snapshot_layout() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = json_persistence(dir.path());

        let snapshot = sample_snapshot();
        let mut all = BTreeMap::new();
        all.insert(snapshot.undo_handle.clone(), snapshot);
        persistence.save_snapshots(&all);

        let raw = fs::read_to_string(dir.path().join("pendingDeletes.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value["undo_abc"];
        assert_eq!(entry["kind"], "user");
        assert_eq!(entry["payload"]["user"]["id"], 3);
        assert_eq!(entry["revokedTokens"][0], "tok-1");
        assert!(entry["expiresAt"].is_string());
    }

    #[test]
    fn test_tokens_round_trip() {
        let persistence = StatePersistence::in_memory().unwrap();
        let mut tokens = BTreeMap::new();
        tokens.insert("t1".to_string(), TokenRecord { user_id: 1 });
        tokens.insert("t2".to_string(), TokenRecord { user_id: 2 });
        assert!(persistence.save_tokens(&tokens));
        assert_eq!(persistence.load_tokens(), tokens);
    }

    #[test]
    fn test_corrupt_document_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("pendingDeletes.json"), "{not json").unwrap();
        fs::write(dir.path().join("authTokens.json"), "[]").unwrap();

        let persistence = json_persistence(dir.path());
        assert!(persistence.load_snapshots().is_empty());
        assert!(persistence.load_tokens().is_empty());
    }

    #[test]
    fn test_write_failure_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = json_persistence(&dir.path().join("gone"));
        fs::remove_dir_all(dir.path().join("gone")).unwrap();

        let users: Vec<UserRecord> = Vec::new();
        assert!(!persistence.save_records(USERS_KEY, &users));
    }
}
