//! Error types for the Meter Ledger Core.

use thiserror::Error;

/// Core errors from key handling and encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid base64: {0}")]
    InvalidEncoding(String),

    #[error("canonical encoding failed: {0}")]
    Canonical(#[from] CanonicalError),
}

/// Errors produced by the canonical encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonicalError {
    #[error("non-finite number cannot be encoded")]
    NonFiniteNumber,

    #[error("absent marker is only allowed as an object member")]
    AbsentOutsideObject,

    #[error("duplicate object key: {0:?}")]
    DuplicateKey(String),
}

/// Validation errors for submitted receipts.
///
/// Everything except [`ValidationError::SignatureFailed`] is a malformed-input
/// error and is raised before any cryptographic work.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid client identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),

    #[error("session id must not be empty")]
    EmptySessionId,

    #[error("session id is {len} bytes, maximum is {max}")]
    SessionIdTooLong { len: usize, max: usize },

    #[error("invalid timestamps: end_ts {end} must be greater than start_ts {start}")]
    NonIncreasingTimestamps { start: i64, end: i64 },

    #[error("{field} is out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("{field} cannot be negative: {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("signature verification failed")]
    SignatureFailed,

    #[error("canonical encoding failed: {0}")]
    Encoding(#[from] CanonicalError),
}

impl ValidationError {
    /// True for errors that reject the receipt before signature checking.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, ValidationError::SignatureFailed)
    }
}

/// Errors building a credit policy from configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("{0} must be a finite number")]
    NonFinite(&'static str),

    #[error("{field} cannot be negative: {value}")]
    Negative { field: &'static str, value: f64 },

    #[error("max_credits_per_session must be greater than zero")]
    NonPositiveCap,

    #[error("{0} is too large: credits overflow for long or large sessions")]
    RateOverflow(&'static str),
}

impl From<CoreError> for ValidationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                ValidationError::SignatureFailed
            }
            CoreError::InvalidEncoding(msg) => ValidationError::InvalidSignatureEncoding(msg),
            CoreError::Canonical(e) => ValidationError::Encoding(e),
        }
    }
}
