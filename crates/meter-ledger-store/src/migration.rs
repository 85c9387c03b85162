//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::now_millis;

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per persisted submission. The primary key is the replay key.
        CREATE TABLE sessions (
            identity BLOB NOT NULL,           -- 32 bytes, Ed25519 public key
            session_id TEXT NOT NULL,         -- client-chosen
            start_ts INTEGER NOT NULL,        -- client clock (Unix ms)
            end_ts INTEGER NOT NULL,          -- client clock (Unix ms)
            bytes_in INTEGER NOT NULL,
            bytes_out INTEGER NOT NULL,
            auxiliary_port INTEGER,           -- unsigned transport hint
            signature BLOB NOT NULL,          -- 64 bytes, Ed25519 signature
            status TEXT NOT NULL,             -- 'accepted' | 'rejected'
            rejection_stage INTEGER,          -- RejectionStage as u8
            reasons TEXT NOT NULL,            -- JSON array of strings
            credits_granted INTEGER NOT NULL, -- hundredths of a credit
            breakdown TEXT,                   -- JSON, accepted only
            policy_version INTEGER,
            canonical_hash BLOB NOT NULL,     -- 32 bytes, Blake3 of signed bytes
            canonical_len INTEGER NOT NULL,
            created_at INTEGER NOT NULL,      -- server clock (Unix ms)

            PRIMARY KEY (identity, session_id),
            CHECK (status IN ('accepted', 'rejected')),
            CHECK (credits_granted >= 0)
        );

        -- One row per credited identity.
        CREATE TABLE ledger (
            identity BLOB PRIMARY KEY,
            balance INTEGER NOT NULL DEFAULT 0,          -- hundredths of a credit
            total_sessions INTEGER NOT NULL DEFAULT 0,
            total_bytes INTEGER NOT NULL DEFAULT 0,
            total_duration_ms INTEGER NOT NULL DEFAULT 0,
            last_session_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,

            CHECK (balance >= 0)
        );

        -- Indexes for common queries
        CREATE INDEX idx_sessions_identity_created ON sessions(identity, created_at);
        CREATE INDEX idx_sessions_status ON sessions(status);
        "#,
    )?;

    Ok(())
}
