//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use meter_ledger_core::{ClientIdentity, CreditDelta, LedgerEntry, SessionId, SessionRecord};

use crate::error::{Result, StoreError};
use crate::traits::Store;

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; a
/// record insert and its ledger update happen under one write guard.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Records by replay key.
    sessions: HashMap<(ClientIdentity, SessionId), StoredRecord>,

    /// Ledger entries by identity.
    ledger: HashMap<ClientIdentity, LedgerEntry>,

    /// Insertion counter, the tiebreak for equal `created_at`.
    next_seq: u64,
}

struct StoredRecord {
    seq: u64,
    record: SessionRecord,
}

impl MemoryStoreInner {
    fn insert(&mut self, record: &SessionRecord) -> Result<()> {
        let key = (record.identity, record.session_id.clone());
        if self.sessions.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                identity: record.identity.to_base64(),
                session_id: record.session_id.to_string(),
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.sessions.insert(
            key,
            StoredRecord {
                seq,
                record: record.clone(),
            },
        );
        Ok(())
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Task("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Task("memory store lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn has_session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner.sessions.contains_key(&(*identity, session_id.clone())))
    }

    async fn insert_rejected(&self, record: &SessionRecord) -> Result<()> {
        if record.is_accepted() {
            return Err(StoreError::InvalidData(
                "accepted record passed to insert_rejected".into(),
            ));
        }
        self.write()?.insert(record)
    }

    async fn commit_accepted(&self, record: &SessionRecord) -> Result<LedgerEntry> {
        let delta = CreditDelta::from_record(record).ok_or_else(|| {
            StoreError::InvalidData("rejected record passed to commit_accepted".into())
        })?;

        let mut inner = self.write()?;
        inner.insert(record)?;

        let entry = inner
            .ledger
            .entry(record.identity)
            .and_modify(|entry| entry.apply_credit(&delta))
            .or_insert_with(|| LedgerEntry::seed(record.identity, &delta));
        Ok(entry.clone())
    }

    async fn get_session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>> {
        let inner = self.read()?;
        Ok(inner
            .sessions
            .get(&(*identity, session_id.clone()))
            .map(|stored| stored.record.clone()))
    }

    async fn list_sessions(
        &self,
        identity: &ClientIdentity,
        limit: usize,
    ) -> Result<Vec<SessionRecord>> {
        let inner = self.read()?;

        let mut matching: Vec<&StoredRecord> = inner
            .sessions
            .values()
            .filter(|stored| stored.record.identity == *identity)
            .collect();
        matching.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        Ok(matching
            .into_iter()
            .take(limit)
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn get_ledger(&self, identity: &ClientIdentity) -> Result<Option<LedgerEntry>> {
        let inner = self.read()?;
        Ok(inner.ledger.get(identity).cloned())
    }
}
