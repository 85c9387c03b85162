//! Error types for the Kernel.

use meter_ledger_core::{PolicyError, ValidationError};
use meter_ledger_store::StoreError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during Kernel operations.
///
/// Rejected submissions are not errors; they come back as a
/// [`crate::Verdict`]. These are the failures a caller cannot act on by
/// fixing the receipt.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Storage error. Nothing was committed.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Policy configuration error.
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;
