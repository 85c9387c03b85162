//! # Meter Ledger Core
//!
//! Pure primitives for the Meter Ledger: signed session receipts, canonical
//! encoding, the credit policy, and the record/ledger data model.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Receipt`] - A client's signed claim of session activity
//! - [`ClientIdentity`] - Opaque Ed25519 public key; a client's only identity
//! - [`CreditPolicy`] - Deterministic mapping from session metrics to credits
//! - [`SessionRecord`] - The server's terminal verdict for one submission
//! - [`LedgerEntry`] - Per-identity running balance and lifetime counters
//!
//! ## Canonicalization
//!
//! Receipts are signed over canonical JSON. See the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod policy;
pub mod receipt;
pub mod record;
pub mod types;
pub mod validation;

pub use canonical::{canonical_string, encode, signed_message, CanonicalValue};
pub use crypto::{verify, Blake3Hash, ClientIdentity, Ed25519Signature, Keypair};
pub use error::{CanonicalError, CoreError, PolicyError, ValidationError};
pub use ledger::{CreditDelta, LedgerEntry};
pub use policy::{CreditBreakdown, CreditPolicy, PolicyConfig, PolicyOutcome};
pub use receipt::{Receipt, ReceiptBuilder, SignedFields, SubmitRequest};
pub use record::{RejectionStage, SessionRecord, SessionStatus};
pub use types::{Credits, SessionId};
pub use validation::{
    parse_request, validate_receipt, validate_receipt_structure, verify_receipt_signature,
    InputLimits,
};
