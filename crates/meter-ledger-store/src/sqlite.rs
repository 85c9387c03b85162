//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for the Meter Ledger. It uses
//! rusqlite with bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use meter_ledger_core::{
    Blake3Hash, ClientIdentity, CreditBreakdown, CreditDelta, Credits, Ed25519Signature,
    LedgerEntry, RejectionStage, SessionId, SessionRecord, SessionStatus,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::Store;

const SESSION_COLUMNS: &str = "identity, session_id, start_ts, end_ts, bytes_in, bytes_out,
    auxiliary_port, signature, status, rejection_stage, reasons, credits_granted,
    breakdown, policy_version, canonical_hash, canonical_len, created_at";

const LEDGER_COLUMNS: &str = "identity, balance, total_sessions, total_bytes,
    total_duration_ms, last_session_at, created_at, updated_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".into()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn to_i64(field: &str, value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("{} {} exceeds storage range", field, value)))
}

fn conversion_error(
    idx: usize,
    ty: Type,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn fixed_bytes<const N: usize>(row: &rusqlite::Row<'_>, idx: usize, name: &str) -> rusqlite::Result<[u8; N]> {
    let bytes: Vec<u8> = row.get(idx)?;
    bytes
        .try_into()
        .map_err(|_| rusqlite::Error::InvalidColumnType(idx, name.into(), Type::Blob))
}

fn non_negative(row: &rusqlite::Row<'_>, idx: usize, name: &str) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    u64::try_from(value).map_err(|_| rusqlite::Error::InvalidColumnType(idx, name.into(), Type::Integer))
}

// Helper to convert a row to SessionRecord
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRecord> {
    let status: String = row.get(8)?;
    let status = SessionStatus::parse(&status)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(8, "status".into(), Type::Text))?;

    let rejection_stage = row
        .get::<_, Option<u8>>(9)?
        .map(|v| {
            RejectionStage::from_u8(v).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(9, "rejection_stage".into(), Type::Integer)
            })
        })
        .transpose()?;

    let reasons: String = row.get(10)?;
    let reasons: Vec<String> =
        serde_json::from_str(&reasons).map_err(|e| conversion_error(10, Type::Text, e))?;

    let breakdown: Option<String> = row.get(12)?;
    let breakdown: Option<CreditBreakdown> = breakdown
        .map(|b| serde_json::from_str(&b))
        .transpose()
        .map_err(|e| conversion_error(12, Type::Text, e))?;

    Ok(SessionRecord {
        identity: ClientIdentity::from_bytes(fixed_bytes(row, 0, "identity")?),
        session_id: SessionId::new(row.get::<_, String>(1)?),
        start_ts: row.get(2)?,
        end_ts: row.get(3)?,
        bytes_in: non_negative(row, 4, "bytes_in")?,
        bytes_out: non_negative(row, 5, "bytes_out")?,
        auxiliary_port: row.get(6)?,
        signature: Ed25519Signature::from_bytes(fixed_bytes(row, 7, "signature")?),
        status,
        rejection_stage,
        reasons,
        credits_granted: Credits::from_hundredths(non_negative(row, 11, "credits_granted")?),
        breakdown,
        policy_version: row.get(13)?,
        canonical_hash: Blake3Hash::from_bytes(fixed_bytes(row, 14, "canonical_hash")?),
        canonical_len: row.get(15)?,
        created_at: row.get(16)?,
    })
}

// Helper to convert a row to LedgerEntry
fn row_to_ledger(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        identity: ClientIdentity::from_bytes(fixed_bytes(row, 0, "identity")?),
        balance: Credits::from_hundredths(non_negative(row, 1, "balance")?),
        total_sessions: non_negative(row, 2, "total_sessions")?,
        total_bytes: non_negative(row, 3, "total_bytes")?,
        total_duration_ms: non_negative(row, 4, "total_duration_ms")?,
        last_session_at: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a record row. Maps a key collision to `AlreadyExists`.
fn insert_record(conn: &Connection, record: &SessionRecord) -> Result<()> {
    let reasons = serde_json::to_string(&record.reasons)?;
    let breakdown = record
        .breakdown
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    let sql = format!(
        "INSERT INTO sessions ({}) VALUES
            (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        SESSION_COLUMNS
    );
    let inserted = conn.execute(
        &sql,
        params![
            record.identity.as_bytes().as_slice(),
            record.session_id.as_str(),
            record.start_ts,
            record.end_ts,
            to_i64("bytes_in", record.bytes_in)?,
            to_i64("bytes_out", record.bytes_out)?,
            record.auxiliary_port,
            record.signature.as_bytes().as_slice(),
            record.status.as_str(),
            record.rejection_stage.map(|s| s.to_u8()),
            reasons,
            to_i64("credits_granted", record.credits_granted.hundredths())?,
            breakdown,
            record.policy_version,
            record.canonical_hash.as_bytes().as_slice(),
            record.canonical_len,
            record.created_at,
        ],
    );

    match inserted {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::AlreadyExists {
            identity: record.identity.to_base64(),
            session_id: record.session_id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn has_session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<bool> {
        let identity = *identity;
        let session_id = session_id.clone();

        self.run(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE identity = ?1 AND session_id = ?2)",
                params![identity.as_bytes().as_slice(), session_id.as_str()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn insert_rejected(&self, record: &SessionRecord) -> Result<()> {
        if record.is_accepted() {
            return Err(StoreError::InvalidData(
                "accepted record passed to insert_rejected".into(),
            ));
        }
        let record = record.clone();

        self.run(move |conn| insert_record(conn, &record)).await
    }

    async fn commit_accepted(&self, record: &SessionRecord) -> Result<LedgerEntry> {
        let delta = CreditDelta::from_record(record).ok_or_else(|| {
            StoreError::InvalidData("rejected record passed to commit_accepted".into())
        })?;
        let record = record.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            insert_record(&tx, &record)?;

            // Atomic increment: concurrent credits to one identity never lose updates.
            tx.execute(
                "INSERT INTO ledger (
                    identity, balance, total_sessions, total_bytes, total_duration_ms,
                    last_session_at, created_at, updated_at
                ) VALUES (?1, ?2, 1, ?3, ?4, ?5, ?5, ?5)
                ON CONFLICT(identity) DO UPDATE SET
                    balance = balance + excluded.balance,
                    total_sessions = total_sessions + 1,
                    total_bytes = total_bytes + excluded.total_bytes,
                    total_duration_ms = total_duration_ms + excluded.total_duration_ms,
                    last_session_at = MAX(COALESCE(last_session_at, excluded.last_session_at),
                                          excluded.last_session_at),
                    updated_at = MAX(updated_at, excluded.updated_at)",
                params![
                    record.identity.as_bytes().as_slice(),
                    to_i64("balance", delta.credits.hundredths())?,
                    to_i64("total_bytes", delta.bytes)?,
                    to_i64("total_duration_ms", delta.duration_ms)?,
                    delta.at,
                ],
            )?;

            let entry = tx.query_row(
                &format!("SELECT {} FROM ledger WHERE identity = ?1", LEDGER_COLUMNS),
                params![record.identity.as_bytes().as_slice()],
                row_to_ledger,
            )?;

            tx.commit()?;
            Ok(entry)
        })
        .await
    }

    async fn get_session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>> {
        let identity = *identity;
        let session_id = session_id.clone();

        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE identity = ?1 AND session_id = ?2",
                    SESSION_COLUMNS
                ),
                params![identity.as_bytes().as_slice(), session_id.as_str()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_sessions(
        &self,
        identity: &ClientIdentity,
        limit: usize,
    ) -> Result<Vec<SessionRecord>> {
        let identity = *identity;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sessions WHERE identity = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                SESSION_COLUMNS
            ))?;

            let records = stmt
                .query_map(params![identity.as_bytes().as_slice(), limit], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
        .await
    }

    async fn get_ledger(&self, identity: &ClientIdentity) -> Result<Option<LedgerEntry>> {
        let identity = *identity;

        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM ledger WHERE identity = ?1", LEDGER_COLUMNS),
                params![identity.as_bytes().as_slice()],
                row_to_ledger,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }
}
