//! # Meter Ledger Testkit
//!
//! Testing utilities for the Meter Ledger.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: receipts with independently computed canonical
//!   messages, keys, and signatures
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: signing clients and empty stores for test setup
//!
//! ## Golden Vectors
//!
//! ```rust
//! use meter_ledger_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     let receipt = vector.receipt();
//!     assert_eq!(receipt.signature.to_base64(), vector.expected_signature);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use meter_ledger_testkit::generators::{ReceiptParams, receipt_from_params};
//!
//! proptest! {
//!     #[test]
//!     fn message_is_deterministic(params: ReceiptParams) {
//!         let r1 = receipt_from_params(&params);
//!         let r2 = receipt_from_params(&params);
//!         prop_assert_eq!(r1.message().unwrap(), r2.message().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use meter_ledger_testkit::fixtures::TestClient;
//!
//! let client = TestClient::new();
//! let request = client.small_request("session-1");
//! assert!(request.signature.is_some());
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{flip_signature_bit, multi_client_fixtures, TestClient, TestFixture};
pub use generators::{receipt_from_params, ReceiptParams};
pub use vectors::{all_vectors, canonical_vectors, verify_all_vectors, GoldenVector};
