//! Ledger: per-identity running balance and lifetime counters.
//!
//! An entry changes only as a consequence of an accepted session record,
//! and then all of its counters move together.

use serde::{Deserialize, Serialize};

use crate::crypto::ClientIdentity;
use crate::record::SessionRecord;
use crate::types::Credits;

/// The amounts one accepted record adds to its identity's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditDelta {
    pub credits: Credits,
    pub bytes: u64,
    pub duration_ms: u64,
    /// Server time of the accepted record.
    pub at: i64,
}

impl CreditDelta {
    /// The delta for a record, or None if the record was not accepted.
    pub fn from_record(record: &SessionRecord) -> Option<Self> {
        if !record.is_accepted() {
            return None;
        }
        Some(Self {
            credits: record.credits_granted,
            bytes: record.total_bytes(),
            duration_ms: u64::try_from(record.duration_ms()).unwrap_or(0),
            at: record.created_at,
        })
    }
}

/// One identity's ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub identity: ClientIdentity,
    pub balance: Credits,
    pub total_sessions: u64,
    pub total_bytes: u64,
    pub total_duration_ms: u64,
    pub last_session_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl LedgerEntry {
    /// The entry created by an identity's first accepted record.
    pub fn seed(identity: ClientIdentity, delta: &CreditDelta) -> Self {
        Self {
            identity,
            balance: delta.credits,
            total_sessions: 1,
            total_bytes: delta.bytes,
            total_duration_ms: delta.duration_ms,
            last_session_at: Some(delta.at),
            created_at: delta.at,
            updated_at: delta.at,
        }
    }

    /// Apply one accepted record's delta.
    pub fn apply_credit(&mut self, delta: &CreditDelta) {
        self.balance = self.balance.saturating_add(delta.credits);
        self.total_sessions = self.total_sessions.saturating_add(1);
        self.total_bytes = self.total_bytes.saturating_add(delta.bytes);
        self.total_duration_ms = self.total_duration_ms.saturating_add(delta.duration_ms);
        self.last_session_at = Some(self.last_session_at.map_or(delta.at, |t| t.max(delta.at)));
        self.updated_at = self.updated_at.max(delta.at);
    }

    pub fn total_duration_seconds(&self) -> f64 {
        self.total_duration_ms as f64 / 1000.0
    }
}
