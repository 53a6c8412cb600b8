use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::models::{PendingSnapshot, SnapshotPayload, UNDO_HANDLE_PREFIX};
use super::scheduler::{ExpiryHandler, ExpiryScheduler};
use crate::core::error::{PostboardError, Result};
use crate::storage::persistence::StatePersistence;


#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoTicket {
    pub undo_handle: String,
    pub expires_at: DateTime<Utc>,
}


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RearmStats {
    pub rearmed: usize,
    pub expired: usize,
}


/// Pending deletes, each guarded by an expiry timer.
///
/// `take` and `expire` both consume an entry under the same lock, so an undo
/// racing the deadline gets exactly one of the two outcomes.
pub struct SnapshotStore {
    entries: Mutex<HashMap<String, PendingSnapshot>>,
    scheduler: ExpiryScheduler,
    persistence: Arc<StatePersistence>,
    persist_lock: Mutex<()>,
}

impl SnapshotStore {
    pub fn new(persistence: Arc<StatePersistence>) -> Arc<Self> {
        Arc::new_cyclic(|store: &Weak<Self>| {
            let store = store.clone();
            let handler: ExpiryHandler = Arc::new(move |handle: &str| {
                if let Some(store) = store.upgrade() {
                    store.expire(handle);
                }
            });

            Self {
                entries: Mutex::new(HashMap::new()),
                scheduler: ExpiryScheduler::new(handler),
                persistence,
                persist_lock: Mutex::new(()),
            }
        })
    }


    pub fn put(
        &self,
        payload: SnapshotPayload,
        revoked_tokens: Vec<String>,
        grace_period: Duration,
    ) -> Result<UndoTicket> {
        let grace = chrono::Duration::from_std(grace_period)
            .map_err(|e| PostboardError::validation(format!("grace period out of range: {e}")))?;
        let undo_handle = format!("{UNDO_HANDLE_PREFIX}{}", Uuid::new_v4().simple());
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(grace)
            .ok_or_else(|| PostboardError::validation("grace period ends past the representable date range"))?;

        let mut entries = self.entries.lock();
        if entries.contains_key(&undo_handle) {
            return Err(PostboardError::Conflict(format!(
                "undo handle collision: {undo_handle}"
            )));
        }

        let snapshot = PendingSnapshot::new(
            undo_handle.clone(),
            payload,
            revoked_tokens,
            created_at,
            expires_at,
        );
        debug!(
            "Pending {} {} until {}",
            snapshot.kind,
            snapshot.payload.entity_id(),
            expires_at
        );
        entries.insert(undo_handle.clone(), snapshot);
        self.scheduler.arm(&undo_handle, expires_at);

        Ok(UndoTicket {
            undo_handle,
            expires_at,
        })
    }


    pub fn take(&self, undo_handle: &str) -> Result<PendingSnapshot> {
        let mut entries = self.entries.lock();
        let Some(snapshot) = entries.get(undo_handle) else {
            return Err(PostboardError::not_found(format!("undo handle {undo_handle}")));
        };

        let past_deadline = snapshot.is_expired_at(Utc::now());
        // a timer that already started firing owns the entry
        let cancelled = self.scheduler.disarm(undo_handle);

        if past_deadline || !cancelled {
            entries.remove(undo_handle);
            drop(entries);
            info!("Undo for {} arrived after its deadline, purged", undo_handle);
            self.persist();
            return Err(PostboardError::not_found(format!(
                "undo handle {undo_handle} expired"
            )));
        }

        entries
            .remove(undo_handle)
            .ok_or_else(|| PostboardError::not_found(format!("undo handle {undo_handle}")))
    }

    /// Called by the scheduler when a grace period elapses.
    pub fn expire(&self, undo_handle: &str) {
        let removed = self.entries.lock().remove(undo_handle);
        match removed {
            Some(snapshot) => {
                info!(
                    "Grace period over, {} {} permanently deleted",
                    snapshot.kind,
                    snapshot.payload.entity_id()
                );
                if !self.persist() {
                    warn!("Purge of {} not persisted, memory state stands", undo_handle);
                }
            }
            None => debug!("Expiry for {} found nothing to purge", undo_handle),
        }
    }

    /// Re-arms persisted snapshots; ones already past their deadline are dropped.
    pub fn rearm_from_persisted(
        &self,
        persisted: impl IntoIterator<Item = PendingSnapshot>,
    ) -> RearmStats {
        let now = Utc::now();
        let mut stats = RearmStats::default();

        {
            let mut entries = self.entries.lock();
            for snapshot in persisted {
                if !snapshot.is_consistent() {
                    warn!("Dropping inconsistent pending snapshot {}", snapshot.undo_handle);
                    stats.expired += 1;
                    continue;
                }
                if snapshot.is_expired_at(now) {
                    debug!("Pending snapshot {} expired while offline", snapshot.undo_handle);
                    stats.expired += 1;
                    continue;
                }
                self.scheduler.arm(&snapshot.undo_handle, snapshot.expires_at);
                entries.insert(snapshot.undo_handle.clone(), snapshot);
                stats.rearmed += 1;
            }
        }

        if stats.expired > 0 {
            self.persist();
        }
        info!(
            "Restored pending deletes: {} re-armed, {} expired",
            stats.rearmed, stats.expired
        );
        stats
    }


    pub fn load(&self) -> RearmStats {
        let persisted = self.persistence.load_snapshots();
        self.rearm_from_persisted(persisted.into_values())
    }


    pub fn contains(&self, undo_handle: &str) -> bool {
        self.entries.lock().contains_key(undo_handle)
    }


    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }


    pub fn pending(&self) -> Vec<PendingSnapshot> {
        self.entries.lock().values().cloned().collect()
    }


    pub fn is_armed(&self, undo_handle: &str) -> bool {
        self.scheduler.is_armed(undo_handle)
    }


    pub fn persist(&self) -> bool {
        let _serial = self.persist_lock.lock();
        let all: BTreeMap<String, PendingSnapshot> = self
            .entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        self.persistence.save_snapshots(&all)
    }

    /// Cancels every timer; pending snapshots stay persisted for the next start.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.scheduler.cancel_all();
        self.persist();
        cancelled
    }
}
