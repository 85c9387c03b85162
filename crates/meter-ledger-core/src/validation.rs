//! Receipt validation: input parsing, structural checks, signature verification.
//!
//! Structural checks run first and never touch cryptography, so malformed
//! input is cheap to reject.

use serde::{Deserialize, Serialize};

use crate::crypto::{ClientIdentity, Ed25519Signature};
use crate::error::ValidationError;
use crate::receipt::{Receipt, SignedFields, SubmitRequest};
use crate::types::SessionId;

/// Largest integer both signer and verifier represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// Default upper bound on session id length, in bytes.
pub const DEFAULT_MAX_SESSION_ID_LEN: usize = 128;

/// Bounds on client-supplied input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputLimits {
    pub max_session_id_len: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_session_id_len: DEFAULT_MAX_SESSION_ID_LEN,
        }
    }
}

/// Parse a submission into a receipt, rejecting malformed input.
///
/// Checks, in order: required fields present, identity and signature decode
/// to the right lengths, then the structural rules of
/// [`validate_receipt_structure`].
pub fn parse_request(
    request: &SubmitRequest,
    limits: &InputLimits,
) -> Result<Receipt, ValidationError> {
    let client_pub = request
        .client_pub
        .as_deref()
        .ok_or(ValidationError::MissingField("client_pub"))?;
    let session_id = request
        .session_id
        .as_deref()
        .ok_or(ValidationError::MissingField("session_id"))?;
    let start_ts = request
        .start_ts
        .ok_or(ValidationError::MissingField("start_ts"))?;
    let end_ts = request.end_ts.ok_or(ValidationError::MissingField("end_ts"))?;
    let bytes_in = request
        .bytes_in
        .ok_or(ValidationError::MissingField("bytes_in"))?;
    let bytes_out = request
        .bytes_out
        .ok_or(ValidationError::MissingField("bytes_out"))?;
    let signature = request
        .signature
        .as_deref()
        .ok_or(ValidationError::MissingField("signature"))?;

    let identity = ClientIdentity::from_base64(client_pub)
        .map_err(|e| ValidationError::InvalidIdentity(e.to_string()))?;
    let signature = Ed25519Signature::from_base64(signature)
        .map_err(|e| ValidationError::InvalidSignatureEncoding(e.to_string()))?;

    let receipt = Receipt {
        fields: SignedFields {
            identity,
            session_id: SessionId::new(session_id),
            start_ts,
            end_ts,
            bytes_in: non_negative("bytes_in", bytes_in)?,
            bytes_out: non_negative("bytes_out", bytes_out)?,
        },
        signature,
        auxiliary_port: request.socks_port,
    };

    validate_receipt_structure(&receipt, limits)?;
    Ok(receipt)
}

fn non_negative(field: &'static str, value: i64) -> Result<u64, ValidationError> {
    u64::try_from(value).map_err(|_| ValidationError::Negative { field, value })
}

/// Validate a receipt's structure without signature verification.
pub fn validate_receipt_structure(
    receipt: &Receipt,
    limits: &InputLimits,
) -> Result<(), ValidationError> {
    let fields = &receipt.fields;

    let id_len = fields.session_id.as_str().len();
    if id_len == 0 {
        return Err(ValidationError::EmptySessionId);
    }
    if id_len > limits.max_session_id_len {
        return Err(ValidationError::SessionIdTooLong {
            len: id_len,
            max: limits.max_session_id_len,
        });
    }

    for (field, value) in [("start_ts", fields.start_ts), ("end_ts", fields.end_ts)] {
        if value < 0 {
            return Err(ValidationError::Negative { field, value });
        }
        if value > MAX_SAFE_INTEGER {
            return Err(ValidationError::OutOfRange { field, value });
        }
    }

    for (field, value) in [("bytes_in", fields.bytes_in), ("bytes_out", fields.bytes_out)] {
        if value > MAX_SAFE_INTEGER as u64 {
            return Err(ValidationError::OutOfRange {
                field,
                value: i64::try_from(value).unwrap_or(i64::MAX),
            });
        }
    }

    if fields.end_ts <= fields.start_ts {
        return Err(ValidationError::NonIncreasingTimestamps {
            start: fields.start_ts,
            end: fields.end_ts,
        });
    }

    Ok(())
}

/// Verify the receipt's signature over its canonical signed fields.
///
/// Returns the canonical bytes that were verified, for hashing into the
/// session record.
pub fn verify_receipt_signature(receipt: &Receipt) -> Result<Vec<u8>, ValidationError> {
    let message = receipt.message()?;
    receipt
        .fields
        .identity
        .verify(&message, &receipt.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;
    Ok(message)
}

/// Full validation: structure, then signature.
pub fn validate_receipt(
    receipt: &Receipt,
    limits: &InputLimits,
) -> Result<Vec<u8>, ValidationError> {
    validate_receipt_structure(receipt, limits)?;
    verify_receipt_signature(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::receipt::ReceiptBuilder;

    fn make_test_keypair() -> Keypair {
        Keypair::from_seed(&[0x42; 32])
    }

    fn make_receipt(keypair: &Keypair) -> Receipt {
        ReceiptBuilder::new(keypair.identity(), "session-0001")
            .window(0, 11_000)
            .bytes(600, 600)
            .sign(keypair)
            .unwrap()
    }

    #[test]
    fn test_valid_receipt() {
        let keypair = make_test_keypair();
        let receipt = make_receipt(&keypair);
        let message = validate_receipt(&receipt, &InputLimits::default()).unwrap();
        assert_eq!(message, receipt.message().unwrap());
    }

    #[test]
    fn test_parse_request_roundtrips_receipt() {
        let keypair = make_test_keypair();
        let receipt = make_receipt(&keypair);
        let parsed = parse_request(&receipt.to_request(), &InputLimits::default()).unwrap();
        assert_eq!(parsed, receipt);
    }

    #[test]
    fn test_missing_fields_reported_by_name() {
        let keypair = make_test_keypair();
        let full = make_receipt(&keypair).to_request();
        let limits = InputLimits::default();

        let cases: Vec<(&str, SubmitRequest)> = vec![
            ("client_pub", SubmitRequest { client_pub: None, ..full.clone() }),
            ("session_id", SubmitRequest { session_id: None, ..full.clone() }),
            ("start_ts", SubmitRequest { start_ts: None, ..full.clone() }),
            ("end_ts", SubmitRequest { end_ts: None, ..full.clone() }),
            ("bytes_in", SubmitRequest { bytes_in: None, ..full.clone() }),
            ("bytes_out", SubmitRequest { bytes_out: None, ..full.clone() }),
            ("signature", SubmitRequest { signature: None, ..full.clone() }),
        ];
        for (name, request) in cases {
            assert_eq!(
                parse_request(&request, &limits),
                Err(ValidationError::MissingField(name))
            );
        }
    }

    #[test]
    fn test_socks_port_is_optional() {
        let keypair = make_test_keypair();
        let request = SubmitRequest {
            socks_port: None,
            ..make_receipt(&keypair).to_request()
        };
        let parsed = parse_request(&request, &InputLimits::default()).unwrap();
        assert_eq!(parsed.auxiliary_port, None);
    }

    #[test]
    fn test_bad_identity_encoding() {
        let keypair = make_test_keypair();
        let request = SubmitRequest {
            client_pub: Some("AAAA".into()),
            ..make_receipt(&keypair).to_request()
        };
        assert!(matches!(
            parse_request(&request, &InputLimits::default()),
            Err(ValidationError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn test_bad_signature_encoding() {
        let keypair = make_test_keypair();
        let request = SubmitRequest {
            signature: Some("%%%".into()),
            ..make_receipt(&keypair).to_request()
        };
        assert!(matches!(
            parse_request(&request, &InputLimits::default()),
            Err(ValidationError::InvalidSignatureEncoding(_))
        ));
    }

    #[test]
    fn test_negative_bytes() {
        let keypair = make_test_keypair();
        let request = SubmitRequest {
            bytes_out: Some(-1),
            ..make_receipt(&keypair).to_request()
        };
        assert_eq!(
            parse_request(&request, &InputLimits::default()),
            Err(ValidationError::Negative {
                field: "bytes_out",
                value: -1
            })
        );
    }

    #[test]
    fn test_end_must_exceed_start() {
        let keypair = make_test_keypair();
        let limits = InputLimits::default();
        for (start, end) in [(5_000, 5_000), (5_000, 4_999)] {
            let receipt = ReceiptBuilder::new(keypair.identity(), "s")
                .window(start, end)
                .bytes(10, 10)
                .sign(&keypair)
                .unwrap();
            assert_eq!(
                validate_receipt_structure(&receipt, &limits),
                Err(ValidationError::NonIncreasingTimestamps { start, end })
            );
        }
    }

    #[test]
    fn test_timestamps_bounded() {
        let keypair = make_test_keypair();
        let limits = InputLimits::default();

        let negative = ReceiptBuilder::new(keypair.identity(), "s")
            .window(-1, 10)
            .sign(&keypair)
            .unwrap();
        assert!(matches!(
            validate_receipt_structure(&negative, &limits),
            Err(ValidationError::Negative { field: "start_ts", .. })
        ));

        let huge = ReceiptBuilder::new(keypair.identity(), "s")
            .window(0, MAX_SAFE_INTEGER + 1)
            .sign(&keypair)
            .unwrap();
        assert!(matches!(
            validate_receipt_structure(&huge, &limits),
            Err(ValidationError::OutOfRange { field: "end_ts", .. })
        ));
    }

    #[test]
    fn test_bytes_bounded() {
        let keypair = make_test_keypair();
        let receipt = ReceiptBuilder::new(keypair.identity(), "s")
            .window(0, 10)
            .bytes(MAX_SAFE_INTEGER as u64 + 1, 0)
            .sign(&keypair)
            .unwrap();
        assert!(matches!(
            validate_receipt_structure(&receipt, &InputLimits::default()),
            Err(ValidationError::OutOfRange { field: "bytes_in", .. })
        ));
    }

    #[test]
    fn test_session_id_length() {
        let keypair = make_test_keypair();
        let limits = InputLimits {
            max_session_id_len: 8,
        };

        let empty = ReceiptBuilder::new(keypair.identity(), "")
            .window(0, 10)
            .sign(&keypair)
            .unwrap();
        assert_eq!(
            validate_receipt_structure(&empty, &limits),
            Err(ValidationError::EmptySessionId)
        );

        let long = ReceiptBuilder::new(keypair.identity(), "123456789")
            .window(0, 10)
            .sign(&keypair)
            .unwrap();
        assert_eq!(
            validate_receipt_structure(&long, &limits),
            Err(ValidationError::SessionIdTooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn test_invalid_signature() {
        let keypair = make_test_keypair();
        let mut receipt = make_receipt(&keypair);
        receipt.signature = Ed25519Signature::from_bytes([0xff; 64]);

        let result = validate_receipt(&receipt, &InputLimits::default());
        assert_eq!(result, Err(ValidationError::SignatureFailed));
        assert!(!ValidationError::SignatureFailed.is_malformed());
    }

    #[test]
    fn test_tampered_field_fails_signature() {
        let keypair = make_test_keypair();
        let mut receipt = make_receipt(&keypair);
        receipt.fields.bytes_in += 1;
        assert_eq!(
            verify_receipt_signature(&receipt),
            Err(ValidationError::SignatureFailed)
        );
    }

    #[test]
    fn test_foreign_identity_fails_signature() {
        let signer = make_test_keypair();
        let other = Keypair::from_seed(&[0x43; 32]);
        let mut receipt = make_receipt(&signer);
        receipt.fields.identity = other.identity();
        assert_eq!(
            verify_receipt_signature(&receipt),
            Err(ValidationError::SignatureFailed)
        );
    }

    #[test]
    fn test_auxiliary_port_does_not_affect_signature() {
        let keypair = make_test_keypair();
        let mut receipt = make_receipt(&keypair);
        receipt.auxiliary_port = Some(1);
        assert!(verify_receipt_signature(&receipt).is_ok());
        receipt.auxiliary_port = Some(65535);
        assert!(verify_receipt_signature(&receipt).is_ok());
    }
}
