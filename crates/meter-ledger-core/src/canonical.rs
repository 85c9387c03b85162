//! Canonical JSON encoding for deterministic signing.
//!
//! Receipts are signed on the client and verified on the server, usually by
//! different runtimes, so the encoding is specified as a standalone algorithm:
//! - Object keys sorted by UTF-16 code units, duplicates rejected
//! - No whitespace anywhere
//! - Strings use JSON quoting (`\"`, `\\`, short escapes, `\u00xx` for controls)
//! - Integers in plain decimal; floats must be finite and use the shortest
//!   round-trip form (exponent notation outside `[1e-6, 1e21)`)
//! - Arrays keep their order
//! - `Absent` object members are dropped entirely, unlike an explicit `null`,
//!   before duplicate keys are checked
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break all existing signatures.

use crate::error::CanonicalError;
use crate::receipt::SignedFields;

/// Signed field names.
pub mod keys {
    pub const CLIENT_PUB: &str = "client_pub";
    pub const SESSION_ID: &str = "session_id";
    pub const START_TS: &str = "start_ts";
    pub const END_TS: &str = "end_ts";
    pub const BYTES_IN: &str = "bytes_in";
    pub const BYTES_OUT: &str = "bytes_out";
}

/// A structured value that can be canonically encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalValue {
    Null,
    Bool(bool),
    Integer(i64),
    Unsigned(u64),
    Number(f64),
    String(String),
    Array(Vec<CanonicalValue>),
    /// Members in any order; sorting happens at encode time.
    Object(Vec<(String, CanonicalValue)>),
    /// "Not provided". Omitted from objects, invalid everywhere else.
    Absent,
}

impl CanonicalValue {
    /// Build an object from `(key, value)` pairs.
    pub fn object<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, CanonicalValue)>,
        K: Into<String>,
    {
        CanonicalValue::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<bool> for CanonicalValue {
    fn from(b: bool) -> Self {
        CanonicalValue::Bool(b)
    }
}

impl From<i64> for CanonicalValue {
    fn from(n: i64) -> Self {
        CanonicalValue::Integer(n)
    }
}

impl From<u64> for CanonicalValue {
    fn from(n: u64) -> Self {
        CanonicalValue::Unsigned(n)
    }
}

impl From<f64> for CanonicalValue {
    fn from(n: f64) -> Self {
        CanonicalValue::Number(n)
    }
}

impl From<&str> for CanonicalValue {
    fn from(s: &str) -> Self {
        CanonicalValue::String(s.to_string())
    }
}

impl From<String> for CanonicalValue {
    fn from(s: String) -> Self {
        CanonicalValue::String(s)
    }
}

impl<T: Into<CanonicalValue>> From<Option<T>> for CanonicalValue {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(CanonicalValue::Absent, Into::into)
    }
}

impl From<&serde_json::Value> for CanonicalValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CanonicalValue::Null,
            Value::Bool(b) => CanonicalValue::Bool(*b),
            Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    CanonicalValue::Unsigned(u)
                } else if let Some(i) = n.as_i64() {
                    CanonicalValue::Integer(i)
                } else {
                    CanonicalValue::Number(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => CanonicalValue::String(s.clone()),
            Value::Array(items) => CanonicalValue::Array(items.iter().map(Into::into).collect()),
            Value::Object(map) => CanonicalValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.into())).collect(),
            ),
        }
    }
}

/// Encode a value to canonical bytes.
pub fn encode(value: &CanonicalValue) -> Result<Vec<u8>, CanonicalError> {
    canonical_string(value).map(String::into_bytes)
}

/// Encode a value to its canonical text.
pub fn canonical_string(value: &CanonicalValue) -> Result<String, CanonicalError> {
    let mut out = String::new();
    encode_value(&mut out, value)?;
    Ok(out)
}

/// The canonical object a client signs for a receipt.
///
/// Exactly the six signed fields; the auxiliary port and every server-side
/// field are never part of it.
pub fn signed_value(fields: &SignedFields) -> CanonicalValue {
    CanonicalValue::object([
        (keys::CLIENT_PUB, CanonicalValue::String(fields.identity.to_base64())),
        (keys::SESSION_ID, CanonicalValue::String(fields.session_id.as_str().to_string())),
        (keys::START_TS, CanonicalValue::Integer(fields.start_ts)),
        (keys::END_TS, CanonicalValue::Integer(fields.end_ts)),
        (keys::BYTES_IN, CanonicalValue::Unsigned(fields.bytes_in)),
        (keys::BYTES_OUT, CanonicalValue::Unsigned(fields.bytes_out)),
    ])
}

/// Construct the signed message for a receipt's signed fields.
pub fn signed_message(fields: &SignedFields) -> Result<Vec<u8>, CanonicalError> {
    encode(&signed_value(fields))
}

fn encode_value(out: &mut String, value: &CanonicalValue) -> Result<(), CanonicalError> {
    match value {
        CanonicalValue::Null => out.push_str("null"),
        CanonicalValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        CanonicalValue::Integer(n) => out.push_str(&n.to_string()),
        CanonicalValue::Unsigned(n) => out.push_str(&n.to_string()),
        CanonicalValue::Number(n) => encode_number(out, *n)?,
        CanonicalValue::String(s) => encode_string(out, s),
        CanonicalValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                encode_value(out, item)?;
            }
            out.push(']');
        }
        CanonicalValue::Object(entries) => encode_object(out, entries)?,
        CanonicalValue::Absent => return Err(CanonicalError::AbsentOutsideObject),
    }
    Ok(())
}

/// Encode an object with sorted keys, skipping absent members.
fn encode_object(
    out: &mut String,
    entries: &[(String, CanonicalValue)],
) -> Result<(), CanonicalError> {
    let mut sorted: Vec<&(String, CanonicalValue)> = entries
        .iter()
        .filter(|(_, value)| !matches!(value, CanonicalValue::Absent))
        .collect();
    sorted.sort_by(|a, b| compare_keys(&a.0, &b.0));

    if let Some(pair) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(CanonicalError::DuplicateKey(pair[0].0.clone()));
    }

    out.push('{');
    let mut first = true;
    for (key, value) in sorted {
        if !first {
            out.push(',');
        }
        first = false;
        encode_string(out, key);
        out.push(':');
        encode_value(out, value)?;
    }
    out.push('}');
    Ok(())
}

/// Key order: UTF-16 code units, which is how the reference signer sorts.
///
/// Differs from byte order only between astral characters and U+E000..U+FFFF.
fn compare_keys(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}

fn encode_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Render a finite float in Number-to-String form.
fn encode_number(out: &mut String, n: f64) -> Result<(), CanonicalError> {
    if !n.is_finite() {
        return Err(CanonicalError::NonFiniteNumber);
    }
    // Covers -0 as well.
    if n == 0.0 {
        out.push('0');
        return Ok(());
    }
    if n < 0.0 {
        out.push('-');
    }

    // `{:e}` yields the shortest round-trip digits, e.g. "1.2345e-7".
    let sci = format!("{:e}", n.abs());
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let exponent: i32 = exponent.parse().unwrap_or(0);

    let k = digits.len() as i32;
    // Decimal point position relative to the digit string.
    let point = exponent + 1;

    if k <= point && point <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((point - k) as usize));
    } else if 0 < point && point <= 21 {
        let (int_part, frac_part) = digits.split_at(point as usize);
        out.push_str(int_part);
        out.push('.');
        out.push_str(frac_part);
    } else if -6 < point && point <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-point) as usize));
        out.push_str(&digits);
    } else {
        let (lead, rest) = digits.split_at(1);
        out.push_str(lead);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let e = point - 1;
        out.push('e');
        out.push(if e >= 0 { '+' } else { '-' });
        out.push_str(&e.abs().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::receipt::ReceiptBuilder;

    fn text(value: &CanonicalValue) -> String {
        canonical_string(value).unwrap()
    }

    #[test]
    fn test_keys_sorted_regardless_of_insertion_order() {
        let a = CanonicalValue::object([
            ("b", CanonicalValue::from(1i64)),
            ("a", CanonicalValue::from("x")),
            ("c", CanonicalValue::Null),
        ]);
        let b = CanonicalValue::object([
            ("c", CanonicalValue::Null),
            ("a", CanonicalValue::from("x")),
            ("b", CanonicalValue::from(1i64)),
        ]);
        assert_eq!(text(&a), r#"{"a":"x","b":1,"c":null}"#);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn test_absent_members_are_omitted() {
        let value = CanonicalValue::object([
            ("present", CanonicalValue::Null),
            ("missing", CanonicalValue::from(None::<i64>)),
            ("port", CanonicalValue::from(Some(9050u64))),
        ]);
        assert_eq!(text(&value), r#"{"port":9050,"present":null}"#);
    }

    #[test]
    fn test_absent_outside_object_is_an_error() {
        assert_eq!(
            encode(&CanonicalValue::Absent),
            Err(CanonicalError::AbsentOutsideObject)
        );
        let arr = CanonicalValue::Array(vec![CanonicalValue::Null, CanonicalValue::Absent]);
        assert_eq!(encode(&arr), Err(CanonicalError::AbsentOutsideObject));
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let value = CanonicalValue::object([
            ("k", CanonicalValue::from(1i64)),
            ("k", CanonicalValue::from(2i64)),
        ]);
        assert_eq!(
            encode(&value),
            Err(CanonicalError::DuplicateKey("k".to_string()))
        );
    }

    #[test]
    fn test_absent_member_does_not_collide() {
        let value = CanonicalValue::object([
            ("k", CanonicalValue::Absent),
            ("k", CanonicalValue::from(1i64)),
        ]);
        assert_eq!(canonical_string(&value).unwrap(), r#"{"k":1}"#);

        let both_absent = CanonicalValue::object([
            ("k", CanonicalValue::Absent),
            ("k", CanonicalValue::Absent),
        ]);
        assert_eq!(canonical_string(&both_absent).unwrap(), "{}");
    }

    #[test]
    fn test_arrays_keep_order() {
        let value = CanonicalValue::Array(vec![
            CanonicalValue::from(3i64),
            CanonicalValue::from(true),
            CanonicalValue::from("z"),
            CanonicalValue::Array(vec![]),
            CanonicalValue::object(Vec::<(String, CanonicalValue)>::new()),
        ]);
        assert_eq!(text(&value), r#"[3,true,"z",[],{}]"#);
    }

    #[test]
    fn test_string_escaping() {
        let value = CanonicalValue::from("q\"b\\n\nt\tc\u{01}\u{1f}é€😀\u{7f}");
        assert_eq!(
            text(&value),
            "\"q\\\"b\\\\n\\nt\\tc\\u0001\\u001fé€😀\u{7f}\""
        );
        let controls = CanonicalValue::from("\u{08}\u{0c}\r");
        assert_eq!(text(&controls), r#""\b\f\r""#);
    }

    #[test]
    fn test_keys_use_string_escaping() {
        let value = CanonicalValue::object([("a\"b", CanonicalValue::from(1i64))]);
        assert_eq!(text(&value), r#"{"a\"b":1}"#);
    }

    #[test]
    fn test_utf16_key_order() {
        // U+FF21 sorts after U+1F600 by bytes, before it by UTF-16 code units.
        let value = CanonicalValue::object([
            ("\u{1F600}", CanonicalValue::from(1i64)),
            ("\u{FF21}", CanonicalValue::from(2i64)),
        ]);
        assert_eq!(text(&value), "{\"\u{1F600}\":1,\"\u{FF21}\":2}");
    }

    #[test]
    fn test_number_formatting() {
        let cases: &[(f64, &str)] = &[
            (0.0, "0"),
            (-0.0, "0"),
            (1.0, "1"),
            (100.0, "100"),
            (1.5, "1.5"),
            (-2.25, "-2.25"),
            (0.1, "0.1"),
            (123.456, "123.456"),
            (0.000001, "0.000001"),
            (1e-7, "1e-7"),
            (2.5e-7, "2.5e-7"),
            (1e20, "100000000000000000000"),
            (1.2345678901234568e20, "123456789012345680000"),
            (1e21, "1e+21"),
            (1.5e300, "1.5e+300"),
            (-1e21, "-1e+21"),
        ];
        for (n, expected) in cases {
            assert_eq!(text(&CanonicalValue::Number(*n)), *expected, "formatting {n:e}");
        }
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        for n in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(
                encode(&CanonicalValue::Number(n)),
                Err(CanonicalError::NonFiniteNumber)
            );
        }
        let nested = CanonicalValue::object([("x", CanonicalValue::Number(f64::NAN))]);
        assert_eq!(encode(&nested), Err(CanonicalError::NonFiniteNumber));
    }

    #[test]
    fn test_integers() {
        assert_eq!(text(&CanonicalValue::Integer(-42)), "-42");
        assert_eq!(text(&CanonicalValue::Unsigned(u64::MAX)), "18446744073709551615");
    }

    #[test]
    fn test_from_serde_json_matches_manual_construction() {
        let json: serde_json::Value =
            serde_json::from_str(r#"{ "z": [1, 2.5, "s"], "a": { "y": null, "b": false } }"#)
                .unwrap();
        assert_eq!(
            text(&CanonicalValue::from(&json)),
            r#"{"a":{"b":false,"y":null},"z":[1,2.5,"s"]}"#
        );
    }

    #[test]
    fn test_signed_message_excludes_auxiliary_port() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let with_port = ReceiptBuilder::new(keypair.identity(), "session-0001")
            .window(0, 11_000)
            .bytes(600, 600)
            .auxiliary_port(9050)
            .sign(&keypair)
            .unwrap();
        let without_port = ReceiptBuilder::new(keypair.identity(), "session-0001")
            .window(0, 11_000)
            .bytes(600, 600)
            .sign(&keypair)
            .unwrap();

        let m1 = signed_message(&with_port.fields).unwrap();
        let m2 = signed_message(&without_port.fields).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(with_port.signature, without_port.signature);
        assert!(!String::from_utf8(m1).unwrap().contains("9050"));
    }

    #[test]
    fn test_signed_message_layout() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let receipt = ReceiptBuilder::new(keypair.identity(), "session-0001")
            .window(0, 11_000)
            .bytes(600, 600)
            .sign(&keypair)
            .unwrap();
        let message = String::from_utf8(signed_message(&receipt.fields).unwrap()).unwrap();
        assert_eq!(
            message,
            format!(
                r#"{{"bytes_in":600,"bytes_out":600,"client_pub":"{}","end_ts":11000,"session_id":"session-0001","start_ts":0}}"#,
                keypair.identity().to_base64()
            )
        );
    }
}
