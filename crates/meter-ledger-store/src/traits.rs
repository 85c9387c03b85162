//! Store trait: the abstract interface for session and ledger persistence.
//!
//! This trait allows the kernel to be storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use meter_ledger_core::{ClientIdentity, LedgerEntry, SessionId, SessionRecord};

use crate::error::Result;

/// The Store trait: async interface for session records and the ledger.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Replay key**: at most one record per `(identity, session_id)`, enforced
///   by the backend itself. A second insert fails with `AlreadyExists`.
/// - **Write once**: records are never updated after insert.
/// - **Atomic credit**: an accepted record and its ledger increment commit
///   together or not at all.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Session Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Check whether any record exists for this key, whatever its verdict.
    async fn has_session(&self, identity: &ClientIdentity, session_id: &SessionId)
        -> Result<bool>;

    /// Persist a rejected record.
    ///
    /// # Errors
    /// - `AlreadyExists` if the key is taken.
    /// - `InvalidData` if the record is accepted.
    async fn insert_rejected(&self, record: &SessionRecord) -> Result<()>;

    /// Persist an accepted record and credit its identity, atomically.
    ///
    /// Returns the ledger entry after the increment.
    ///
    /// # Errors
    /// - `AlreadyExists` if the key is taken; the ledger is untouched.
    /// - `InvalidData` if the record is not accepted.
    async fn commit_accepted(&self, record: &SessionRecord) -> Result<LedgerEntry>;

    /// Get a record by key.
    async fn get_session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>>;

    /// List an identity's records, most recent first.
    async fn list_sessions(
        &self,
        identity: &ClientIdentity,
        limit: usize,
    ) -> Result<Vec<SessionRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Get an identity's ledger entry, if it has ever been credited.
    async fn get_ledger(&self, identity: &ClientIdentity) -> Result<Option<LedgerEntry>>;
}

/// Extension trait for common store patterns.
pub trait StoreExt: Store {
    /// Persist a record through whichever path its status requires.
    ///
    /// Returns the updated ledger entry for accepted records, `None` otherwise.
    fn record_verdict(
        &self,
        record: &SessionRecord,
    ) -> impl std::future::Future<Output = Result<Option<LedgerEntry>>> + Send;
}

impl<S: Store + ?Sized> StoreExt for S {
    async fn record_verdict(&self, record: &SessionRecord) -> Result<Option<LedgerEntry>> {
        if record.is_accepted() {
            self.commit_accepted(record).await.map(Some)
        } else {
            self.insert_rejected(record).await.map(|_| None)
        }
    }
}
