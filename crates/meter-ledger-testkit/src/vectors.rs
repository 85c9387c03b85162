//! Golden test vectors for deterministic verification.
//!
//! The expected strings pin the canonical encoding, key derivation, and
//! signatures for fixed seeds, so any change to their output fails here.

use meter_ledger_core::{
    canonical_string, CanonicalValue, Credits, Keypair, Receipt, ReceiptBuilder,
};

/// A golden receipt vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Ed25519 seed; every byte is the same value.
    pub seed: [u8; 32],
    pub session_id: &'static str,
    pub start_ts: i64,
    pub end_ts: i64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// Expected public key, hex.
    pub expected_public_key_hex: &'static str,
    /// Expected public key, standard padded base64.
    pub expected_client_pub: &'static str,
    /// Expected canonical message.
    pub expected_message: &'static str,
    /// Expected signature, base64.
    pub expected_signature: &'static str,
    /// Credits under the default policy, in hundredths.
    pub expected_credits: u64,
}

impl GoldenVector {
    pub fn keypair(&self) -> Keypair {
        Keypair::from_seed(&self.seed)
    }

    /// Build and sign the receipt this vector describes.
    pub fn receipt(&self) -> Receipt {
        let keypair = self.keypair();
        ReceiptBuilder::new(keypair.identity(), self.session_id)
            .window(self.start_ts, self.end_ts)
            .bytes(self.bytes_in, self.bytes_out)
            .sign(&keypair)
            .unwrap_or_else(|e| panic!("vector '{}' failed to encode: {}", self.name, e))
    }

    pub fn expected_credits(&self) -> Credits {
        Credits::from_hundredths(self.expected_credits)
    }

    /// The submission as a client would send it, using the expected values.
    pub fn request_json(&self) -> serde_json::Value {
        serde_json::json!({
            "client_pub": self.expected_client_pub,
            "session_id": self.session_id,
            "start_ts": self.start_ts,
            "end_ts": self.end_ts,
            "bytes_in": self.bytes_in,
            "bytes_out": self.bytes_out,
            "signature": self.expected_signature,
        })
    }
}

/// Get all golden receipt vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "small session at 1.10 credits",
            seed: [0x42; 32],
            session_id: "session-0001",
            start_ts: 0,
            end_ts: 11_000,
            bytes_in: 600,
            bytes_out: 600,
            expected_public_key_hex:
                "2152f8d19b791d24453242e15f2eab6cb7cffa7b6a5ed30097960e069881db12",
            expected_client_pub: "IVL40Zt5HSRFMkLhXy6rbLfP+ntqXtMAl5YOBpiB2xI=",
            expected_message: r#"{"bytes_in":600,"bytes_out":600,"client_pub":"IVL40Zt5HSRFMkLhXy6rbLfP+ntqXtMAl5YOBpiB2xI=","end_ts":11000,"session_id":"session-0001","start_ts":0}"#,
            expected_signature: "GpvuZYaLDnicgVUsYpL9Aqs6llZJrExffWm+/GaAQYHJO719SeKyzeUVWoQj+74zPckUoDEGpu7qiPEQRUVNDw==",
            expected_credits: 110,
        },
        GoldenVector {
            name: "one minute, 1.5 MiB",
            seed: [0x01; 32],
            session_id: "a1b2c3d4-0000-4000-8000-000000000001",
            start_ts: 1_700_000_000_000,
            end_ts: 1_700_000_060_000,
            bytes_in: 1_048_576,
            bytes_out: 524_288,
            expected_public_key_hex:
                "8a88e3dd7409f195fd52db2d3cba5d72ca6709bf1d94121bf3748801b40f6f5c",
            expected_client_pub: "iojj3XQJ8ZX9UtstPLpdcspnCb8dlBIb83SIAbQPb1w=",
            expected_message: r#"{"bytes_in":1048576,"bytes_out":524288,"client_pub":"iojj3XQJ8ZX9UtstPLpdcspnCb8dlBIb83SIAbQPb1w=","end_ts":1700000060000,"session_id":"a1b2c3d4-0000-4000-8000-000000000001","start_ts":1700000000000}"#,
            expected_signature: "O0OBfjTjgRVnKVYNGGw+napdOlN5rjWzzOvVKwqvcq1pBsLtxNrET9Q8V7ot1qEYhlCWCXn7FhlZsQjTJmP2Ag==",
            expected_credits: 675,
        },
        GoldenVector {
            name: "exactly at both minimums",
            seed: [0x07; 32],
            session_id: "min",
            start_ts: 1_000,
            end_ts: 11_000,
            bytes_in: 512,
            bytes_out: 512,
            expected_public_key_hex:
                "ea4a6c63e29c520abef5507b132ec5f9954776aebebe7b92421eea691446d22c",
            expected_client_pub: "6kpsY+KcUgq+9VB7Ey7F+ZVHdq6+vnuSQh7qaRRG0iw=",
            expected_message: r#"{"bytes_in":512,"bytes_out":512,"client_pub":"6kpsY+KcUgq+9VB7Ey7F+ZVHdq6+vnuSQh7qaRRG0iw=","end_ts":11000,"session_id":"min","start_ts":1000}"#,
            expected_signature: "VkGWNvZuw5KMhzo6tjyhlBjCkfeXO9q5cfYG0CfI7UkwrR9f0+P9daKYT5zh4EppSZfjP+wo9iRBTiwzJf5kAQ==",
            expected_credits: 100,
        },
    ]
}

/// A golden canonical-encoding case.
#[derive(Debug, Clone)]
pub struct CanonicalVector {
    pub name: &'static str,
    pub value: CanonicalValue,
    pub expected: &'static str,
}

/// Encoding cases beyond the receipt shape: key order, omission, escaping,
/// and number formatting.
pub fn canonical_vectors() -> Vec<CanonicalVector> {
    vec![
        CanonicalVector {
            name: "keys sorted, nesting preserved",
            value: CanonicalValue::object([
                ("b", CanonicalValue::from(1i64)),
                (
                    "a",
                    CanonicalValue::object([
                        ("z", CanonicalValue::from(true)),
                        ("y", CanonicalValue::Null),
                    ]),
                ),
            ]),
            expected: r#"{"a":{"y":null,"z":true},"b":1}"#,
        },
        CanonicalVector {
            name: "absent members omitted",
            value: CanonicalValue::object([
                ("kept", CanonicalValue::from("x")),
                ("dropped", CanonicalValue::Absent),
                ("also_dropped", CanonicalValue::from(None::<i64>)),
            ]),
            expected: r#"{"kept":"x"}"#,
        },
        CanonicalVector {
            name: "array order preserved",
            value: CanonicalValue::Array(vec![
                CanonicalValue::from(3i64),
                CanonicalValue::from(1i64),
                CanonicalValue::from(2i64),
            ]),
            expected: "[3,1,2]",
        },
        CanonicalVector {
            name: "string escapes",
            value: CanonicalValue::from("tab\there \"quoted\" \\ \u{1}"),
            expected: r#""tab\there \"quoted\" \\ \u0001""#,
        },
        CanonicalVector {
            name: "numbers",
            value: CanonicalValue::Array(vec![
                CanonicalValue::from(1.5f64),
                CanonicalValue::from(2.0f64),
                CanonicalValue::from(-0.0f64),
                CanonicalValue::from(1e21f64),
                CanonicalValue::from(0.000001f64),
                CanonicalValue::from(u64::MAX),
            ]),
            expected: "[1.5,2,0,1e+21,0.000001,18446744073709551615]",
        },
    ]
}

/// Check every receipt vector and report `(name, matches, actual_message)`.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let receipt = v.receipt();
            let message = receipt
                .message()
                .map(|m| String::from_utf8_lossy(&m).into_owned())
                .unwrap_or_default();
            let matches = message == v.expected_message
                && receipt.signature.to_base64() == v.expected_signature
                && receipt.identity().to_base64() == v.expected_client_pub
                && hex::encode(receipt.identity().as_bytes()) == v.expected_public_key_hex;
            (v.name.to_string(), matches, message)
        })
        .collect()
}

/// Check every canonical vector and report `(name, matches, actual)`.
pub fn verify_canonical_vectors() -> Vec<(String, bool, String)> {
    canonical_vectors()
        .iter()
        .map(|v| {
            let actual = canonical_string(&v.value).unwrap_or_default();
            (v.name.to_string(), actual == v.expected, actual)
        })
        .collect()
}
