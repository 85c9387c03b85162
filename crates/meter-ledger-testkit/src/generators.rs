//! Proptest generators for property-based testing.

use proptest::prelude::*;

use meter_ledger_core::validation::MAX_SAFE_INTEGER;
use meter_ledger_core::{CanonicalValue, ClientIdentity, Keypair, Receipt, ReceiptBuilder};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random identity.
pub fn identity() -> impl Strategy<Value = ClientIdentity> {
    keypair().prop_map(|kp| kp.identity())
}

/// Session ids within the default length limit, including non-ASCII text.
pub fn session_id() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9-]{1,64}",
        "[a-f0-9]{8}-[a-f0-9]{4}-4[a-f0-9]{3}-[89ab][a-f0-9]{3}-[a-f0-9]{12}",
        "\\PC{1,32}",
    ]
}

/// Plausible client clock values.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000
}

/// Byte counters in the exactly-representable range.
pub fn byte_count() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..=1 << 32, 0u64..=MAX_SAFE_INTEGER as u64]
}

/// Keys for canonical objects, including escapes and astral characters.
pub fn object_key() -> impl Strategy<Value = String> {
    prop_oneof!["[a-z_]{1,12}", "\\PC{0,8}", Just("\u{1F600}".to_string())]
}

/// Arbitrary encodable values, nested a few levels deep.
pub fn canonical_value() -> impl Strategy<Value = CanonicalValue> {
    let leaf = prop_oneof![
        Just(CanonicalValue::Null),
        any::<bool>().prop_map(CanonicalValue::Bool),
        any::<i64>().prop_map(CanonicalValue::Integer),
        any::<u64>().prop_map(CanonicalValue::Unsigned),
        prop::num::f64::NORMAL.prop_map(CanonicalValue::Number),
        "\\PC{0,16}".prop_map(CanonicalValue::String),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(CanonicalValue::Array),
            prop::collection::btree_map(object_key(), inner, 0..6)
                .prop_map(|m| CanonicalValue::Object(m.into_iter().collect())),
        ]
    })
}

/// Parameters for generating a receipt.
#[derive(Debug, Clone)]
pub struct ReceiptParams {
    pub keypair: Keypair,
    pub session_id: String,
    pub start_ts: i64,
    pub duration_ms: i64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub auxiliary_port: Option<u16>,
}

impl Arbitrary for ReceiptParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            any::<[u8; 32]>(), // seed
            session_id(),
            timestamp(),
            1i64..=86_400_000, // up to a day
            byte_count(),
            byte_count(),
            any::<Option<u16>>(),
        )
            .prop_map(
                |(seed, session_id, start_ts, duration_ms, bytes_in, bytes_out, port)| {
                    ReceiptParams {
                        keypair: Keypair::from_seed(&seed),
                        session_id,
                        start_ts,
                        duration_ms,
                        bytes_in,
                        bytes_out,
                        auxiliary_port: port,
                    }
                },
            )
            .boxed()
    }
}

/// Generate a signed receipt from parameters.
pub fn receipt_from_params(params: &ReceiptParams) -> Receipt {
    let mut builder = ReceiptBuilder::new(params.keypair.identity(), params.session_id.as_str())
        .window(params.start_ts, params.start_ts + params.duration_ms)
        .bytes(params.bytes_in, params.bytes_out);

    if let Some(port) = params.auxiliary_port {
        builder = builder.auxiliary_port(port);
    }

    builder
        .sign(&params.keypair)
        .unwrap_or_else(|e| panic!("generated receipt failed to encode: {}", e))
}
