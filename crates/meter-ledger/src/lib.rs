//! # Meter Ledger
//!
//! Turns signed bandwidth session receipts into credits.
//!
//! ## Overview
//!
//! A client meters a relayed session, signs a summary of it with its Ed25519
//! key, and submits the receipt. The kernel:
//!
//! - **Parses** the submission and rejects malformed input before any crypto
//! - **Checks replay**: each `(identity, session_id)` is processed once
//! - **Verifies** the signature over the canonical JSON encoding
//! - **Prices** the session under the active, versioned credit policy
//! - **Records** the verdict and credits the identity's ledger atomically
//!
//! ## Key Concepts
//!
//! - **Identity**: the client's 32-byte Ed25519 public key, base64 on the wire.
//! - **Canonical encoding**: sorted-key, whitespace-free JSON. Signer and
//!   verifier must produce identical bytes.
//! - **Verdict**: every submission gets one; rejections name the failing stage.
//! - **Ledger**: per-identity running balance, only ever incremented.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meter_ledger::{CreditKernel, LedgerConfig};
//! use meter_ledger::core::{Keypair, ReceiptBuilder};
//!
//! async fn example() {
//!     let kernel = CreditKernel::open(&LedgerConfig::default()).unwrap();
//!
//!     let keypair = Keypair::generate();
//!     let receipt = ReceiptBuilder::new(keypair.identity(), "session-1")
//!         .window(1_700_000_000_000, 1_700_000_060_000)
//!         .bytes(1_048_576, 524_288)
//!         .sign(&keypair)
//!         .unwrap();
//!
//!     let verdict = kernel.submit(&receipt.to_request()).await.unwrap();
//!     assert!(verdict.accepted);
//!
//!     let balance = kernel.balance(&keypair.identity()).await.unwrap();
//!     println!("balance: {}", balance.credits());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `meter_ledger::core` - receipts, canonical encoding, crypto, policy
//! - `meter_ledger::store` - storage trait, SQLite and in-memory backends

pub mod config;
pub mod error;
pub mod kernel;
pub mod logging;
pub mod verdict;

// Re-export component crates
pub use meter_ledger_core as core;
pub use meter_ledger_store as store;

// Re-export main types for convenience
pub use config::{ConfigError, LedgerConfig, LoggingConfig};
pub use error::{KernelError, Result};
pub use kernel::{CreditKernel, KernelConfig};
pub use logging::{init_logging, LogFormat};
pub use verdict::{Balance, Rejection, Verdict, REPLAY_REASON, SIGNATURE_REASON};

// Re-export commonly used core types
pub use meter_ledger_core::{
    ClientIdentity, CreditBreakdown, CreditPolicy, Credits, Keypair, PolicyConfig, Receipt,
    ReceiptBuilder, RejectionStage, SessionId, SessionRecord, SubmitRequest,
};
pub use meter_ledger_store::{MemoryStore, SqliteStore, Store};
