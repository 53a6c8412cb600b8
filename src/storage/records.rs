use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::models::Record;
use super::persistence::StatePersistence;


/// Ordered in-memory list of records, persisted as one document.
///
/// Ids are allocated from a counter that only moves forward, so an id held by
/// a pending snapshot is never handed to a new record.
pub struct RecordStore<T: Record> {
    key: &'static str,
    records: RwLock<Vec<T>>,
    next_id: AtomicU64,
    persistence: Arc<StatePersistence>,
    persist_lock: Mutex<()>,
}

impl<T: Record> RecordStore<T> {

    pub fn load(key: &'static str, persistence: Arc<StatePersistence>) -> Self {
        let mut records: Vec<T> = persistence.load_records(key);
        records.sort_by_key(|r| r.id());
        let next_id = records.last().map_or(1, |r| r.id() + 1);
        debug!("Loaded {} records from '{}'", records.len(), key);

        Self {
            key,
            records: RwLock::new(records),
            next_id: AtomicU64::new(next_id),
            persistence,
            persist_lock: Mutex::new(()),
        }
    }


    pub fn list(&self) -> Vec<T> {
        self.records.read().clone()
    }


    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }


    pub fn get(&self, id: u64) -> Option<T> {
        let records = self.records.read();
        Self::position(&records, id).ok().map(|i| records[i].clone())
    }


    pub fn any(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.records.read().iter().any(predicate)
    }


    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Ensures `id` is never allocated again.
    pub fn reserve_id(&self, id: u64) {
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }


    pub fn insert(&self, record: T) {
        self.reserve_id(record.id());
        let mut records = self.records.write();
        match Self::position(&records, record.id()) {
            Ok(i) => {
                warn!("Replacing existing record {} in '{}'", record.id(), self.key);
                records[i] = record;
            }
            Err(i) => records.insert(i, record),
        }
    }


    pub fn insert_many(&self, incoming: impl IntoIterator<Item = T>) {
        for record in incoming {
            self.insert(record);
        }
    }


    pub fn remove(&self, id: u64) -> Option<T> {
        let mut records = self.records.write();
        Self::position(&records, id).ok().map(|i| records.remove(i))
    }


    pub fn remove_where(&self, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let mut records = self.records.write();
        let (removed, kept): (Vec<T>, Vec<T>) = records.drain(..).partition(|r| predicate(r));
        *records = kept;
        removed
    }


    pub fn update(&self, id: u64, apply: impl FnOnce(&mut T)) -> Option<T> {
        let mut records = self.records.write();
        let i = Self::position(&records, id).ok()?;
        apply(&mut records[i]);
        Some(records[i].clone())
    }


    pub fn persist(&self) -> bool {
        let _serial = self.persist_lock.lock();
        let records = self.list();
        self.persistence.save_records(self.key, &records)
    }

    fn position(records: &[T], id: u64) -> Result<usize, usize> {
        records.binary_search_by_key(&id, |r| r.id())
    }
}
