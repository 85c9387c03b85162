//! # Meter Ledger Store
//!
//! Storage abstraction for the Meter Ledger. Provides a trait-based interface
//! for session record and ledger persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meter_ledger_store::{SqliteStore, Store};
//! use meter_ledger_core::Keypair;
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("ledger.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     let identity = Keypair::generate().identity();
//!     let entry = store.get_ledger(&identity).await.unwrap();
//!     assert!(entry.is_none());
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Replay key**: `(identity, session_id)` is unique; a second insert
//!   returns `AlreadyExists`
//! - **Atomic credit**: an accepted record and its ledger increment share one
//!   transaction (SQLite) or one write lock (memory)

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{Store, StoreExt};

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
