//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use meter_ledger_core::{ClientIdentity, Keypair, Receipt, ReceiptBuilder, SubmitRequest};
use meter_ledger_store::MemoryStore;

/// A metering client: a keypair plus helpers to sign sessions.
pub struct TestClient {
    pub keypair: Keypair,
}

impl TestClient {
    /// Create a client with a random keypair.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::from_seed(&rand::random::<[u8; 32]>()),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn identity(&self) -> ClientIdentity {
        self.keypair.identity()
    }

    /// Sign a session starting at `start_ts`.
    pub fn receipt(
        &self,
        session_id: &str,
        start_ts: i64,
        duration_ms: i64,
        bytes_in: u64,
        bytes_out: u64,
    ) -> Receipt {
        ReceiptBuilder::new(self.identity(), session_id)
            .window(start_ts, start_ts + duration_ms)
            .bytes(bytes_in, bytes_out)
            .sign(&self.keypair)
            .unwrap_or_else(|e| panic!("failed to sign {}: {}", session_id, e))
    }

    /// A session that clears the default policy: 11 s and 1200 bytes.
    pub fn small_session(&self, session_id: &str) -> Receipt {
        self.receipt(session_id, 0, 11_000, 600, 600)
    }

    /// The wire form of [`small_session`](Self::small_session).
    pub fn small_request(&self, session_id: &str) -> SubmitRequest {
        self.small_session(session_id).to_request()
    }
}

impl Default for TestClient {
    fn default() -> Self {
        Self::new()
    }
}

/// A client and an empty memory store.
pub struct TestFixture {
    pub client: TestClient,
    pub store: MemoryStore,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            client: TestClient::new(),
            store: MemoryStore::new(),
        }
    }

    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self {
            client: TestClient::with_seed(seed),
            store: MemoryStore::new(),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create distinct deterministic clients.
pub fn multi_client_fixtures(count: usize) -> Vec<TestClient> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[..8].copy_from_slice(&(i as u64).to_le_bytes());
            seed[31] = 0xC1;
            TestClient::with_seed(seed)
        })
        .collect()
}

/// Flip one bit of a base64 signature and re-encode it.
///
/// Returns `None` if the input is not valid base64 or the bit is out of range.
pub fn flip_signature_bit(encoded: &str, bit: usize) -> Option<String> {
    use meter_ledger_core::Ed25519Signature;

    let mut bytes = Ed25519Signature::from_base64(encoded).ok()?.as_bytes().to_owned();
    *bytes.get_mut(bit / 8)? ^= 1 << (bit % 8);
    Some(Ed25519Signature::from_bytes(bytes).to_base64())
}
