//! End-to-end submission tests against both store backends.

use std::sync::Arc;

use meter_ledger::core::{Credits, PolicyConfig, RejectionStage, SessionId, SessionStatus};
use meter_ledger::{
    Balance, CreditKernel, LedgerConfig, MemoryStore, SqliteStore, REPLAY_REASON,
    SIGNATURE_REASON,
};
use meter_ledger_testkit::fixtures::{flip_signature_bit, TestClient};

const MIB: u64 = 1_048_576;

fn memory_kernel() -> CreditKernel<MemoryStore> {
    CreditKernel::with_defaults(MemoryStore::new())
}

fn sqlite_kernel() -> CreditKernel<SqliteStore> {
    CreditKernel::with_defaults(SqliteStore::open_memory().unwrap())
}

// ─────────────────────────────────────────────────────────────────────────────
// Acceptance and replay
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_small_session_then_replay() {
    let kernel = sqlite_kernel();
    let client = TestClient::with_seed([0x42; 32]);
    let request = client.small_request("session-0001");

    let verdict = kernel.submit(&request).await.unwrap();
    assert!(verdict.accepted);
    assert_eq!(verdict.credits, Credits::from_hundredths(110));
    let breakdown = verdict.breakdown.as_ref().unwrap();
    assert!(!breakdown.cap_applied);
    assert_eq!(breakdown.capped_from, None);

    let replay = kernel.submit(&request).await.unwrap();
    assert!(!replay.accepted);
    assert_eq!(replay.stage(), Some(RejectionStage::Replay));
    assert_eq!(replay.reasons(), [REPLAY_REASON.to_string()]);
    assert_eq!(replay.credits, Credits::ZERO);

    let entry = kernel.balance(&client.identity()).await.unwrap();
    let entry = entry.entry().unwrap();
    assert_eq!(entry.balance, Credits::from_hundredths(110));
    assert_eq!(entry.total_sessions, 1);
    assert_eq!(entry.total_bytes, 1200);
    assert_eq!(entry.total_duration_ms, 11_000);
}

#[tokio::test]
async fn test_same_session_id_for_different_identities() {
    let kernel = memory_kernel();
    let alice = TestClient::new();
    let bob = TestClient::new();

    assert!(kernel.submit(&alice.small_request("shared")).await.unwrap().accepted);
    assert!(kernel.submit(&bob.small_request("shared")).await.unwrap().accepted);
}

#[tokio::test]
async fn test_balance_no_entry_for_unknown_identity() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();
    let balance = kernel.balance(&client.identity()).await.unwrap();
    assert_eq!(balance, Balance::NoEntry);
    assert_eq!(balance.credits(), Credits::ZERO);
}

#[tokio::test]
async fn test_auxiliary_port_is_not_signed() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();
    let mut request = client.small_request("with-port");
    request.socks_port = Some(1080);

    let verdict = kernel.submit(&request).await.unwrap();
    assert!(verdict.accepted);

    let record = kernel
        .session(&client.identity(), &SessionId::from("with-port"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.auxiliary_port, Some(1080));
}

// ─────────────────────────────────────────────────────────────────────────────
// Malformed input
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_malformed_is_not_persisted() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();
    let good = client.small_request("s1");

    let mut missing = good.clone();
    missing.signature = None;
    let verdict = kernel.submit(&missing).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Malformed));
    assert_eq!(verdict.session_id.as_deref(), Some("s1"));

    let mut short_key = good.clone();
    short_key.client_pub = Some("AAAA".to_string());
    let verdict = kernel.submit(&short_key).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Malformed));

    let mut negative = good.clone();
    negative.bytes_in = Some(-1);
    let verdict = kernel.submit(&negative).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Malformed));

    assert!(kernel
        .session(&client.identity(), &SessionId::from("s1"))
        .await
        .unwrap()
        .is_none());

    // The key is still free.
    assert!(kernel.submit(&good).await.unwrap().accepted);
}

#[tokio::test]
async fn test_timestamps_must_increase() {
    let kernel = memory_kernel();
    let client = TestClient::new();

    let mut request = client.small_request("s1");
    request.end_ts = request.start_ts;
    let verdict = kernel.submit(&request).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Malformed));
}

#[tokio::test]
async fn test_session_id_length_limit() {
    let kernel = memory_kernel();
    let client = TestClient::new();

    let at_limit = "x".repeat(128);
    assert!(kernel.submit(&client.small_request(&at_limit)).await.unwrap().accepted);

    let over = "x".repeat(129);
    let verdict = kernel.submit(&client.small_request(&over)).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Malformed));
}

// ─────────────────────────────────────────────────────────────────────────────
// Signatures
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_signature_bit_flips_rejected_and_persisted() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();

    for bit in [0, 7, 100, 255, 256, 400, 511] {
        let session = format!("flip-{}", bit);
        let mut request = client.small_request(&session);
        let signature = request.signature.take().unwrap();
        request.signature = flip_signature_bit(&signature, bit);

        let verdict = kernel.submit(&request).await.unwrap();
        assert_eq!(verdict.stage(), Some(RejectionStage::Signature), "bit {}", bit);
        assert_eq!(verdict.reasons(), [SIGNATURE_REASON.to_string()]);

        let record = kernel
            .session(&client.identity(), &SessionId::from(session.as_str()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, SessionStatus::Rejected);
        assert_eq!(record.credits_granted, Credits::ZERO);
    }

    assert_eq!(kernel.balance(&client.identity()).await.unwrap(), Balance::NoEntry);
}

#[tokio::test]
async fn test_altered_fields_fail_verification() {
    let kernel = memory_kernel();
    let client = TestClient::new();

    let mut inflated = client.small_request("inflated");
    inflated.bytes_out = inflated.bytes_out.map(|b| b + 1_000_000);
    let verdict = kernel.submit(&inflated).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Signature));

    let mut stretched = client.small_request("stretched");
    stretched.end_ts = stretched.end_ts.map(|t| t + 60_000);
    let verdict = kernel.submit(&stretched).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Signature));

    // Another client's key over this client's signature.
    let other = TestClient::new();
    let mut swapped = client.small_request("swapped");
    swapped.client_pub = Some(other.identity().to_base64());
    let verdict = kernel.submit(&swapped).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Signature));
    assert_eq!(kernel.balance(&other.identity()).await.unwrap(), Balance::NoEntry);
}

#[tokio::test]
async fn test_rejected_key_cannot_be_resubmitted() {
    let kernel = memory_kernel();
    let client = TestClient::new();

    let mut forged = client.small_request("s1");
    forged.bytes_in = Some(999_999);
    let verdict = kernel.submit(&forged).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Signature));

    let verdict = kernel.submit(&client.small_request("s1")).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Replay));
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_duration_boundary() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();

    let at_min = client.receipt("at-min", 5_000, 10_000, 512, 512);
    let verdict = kernel.submit_receipt(&at_min).await.unwrap();
    assert!(verdict.accepted);
    assert_eq!(verdict.credits, Credits::from_hundredths(100));

    let below = client.receipt("below", 5_000, 9_999, 512, 512);
    let verdict = kernel.submit_receipt(&below).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Policy));
    assert_eq!(verdict.reasons().len(), 1);
    assert!(verdict.reasons()[0].starts_with("Duration"));
    assert_eq!(verdict.policy_version, Some(1));

    let record = kernel
        .session(&client.identity(), &SessionId::from("below"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.rejection_stage, Some(RejectionStage::Policy));
    assert_eq!(record.policy_version, Some(1));
}

#[tokio::test]
async fn test_bytes_boundary_and_both_reasons() {
    let kernel = memory_kernel();
    let client = TestClient::new();

    let at_min = client.receipt("at-min", 0, 20_000, 1024, 0);
    assert!(kernel.submit_receipt(&at_min).await.unwrap().accepted);

    let below = client.receipt("below", 0, 20_000, 1000, 23);
    let verdict = kernel.submit_receipt(&below).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Policy));
    assert!(verdict.reasons()[0].starts_with("Total bytes 1023"));

    let both = client.receipt("both", 0, 1_000, 10, 10);
    let verdict = kernel.submit_receipt(&both).await.unwrap();
    assert_eq!(verdict.reasons().len(), 2);
}

#[tokio::test]
async fn test_cap_clamps_and_flags() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();

    let huge = client.receipt("huge", 0, 11_000, 200 * MIB, 100 * MIB);
    let verdict = kernel.submit_receipt(&huge).await.unwrap();
    assert!(verdict.accepted);
    assert_eq!(verdict.credits, Credits::from_hundredths(10_000));

    let breakdown = verdict.breakdown.as_ref().unwrap();
    assert!(breakdown.cap_applied);
    assert!(breakdown.capped_from.unwrap() > 100.0);
    assert!(verdict.notes[0].starts_with("Credits capped from"));

    let stored = kernel
        .session(&client.identity(), &SessionId::from("huge"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.breakdown.as_ref(), Some(breakdown));
}

#[tokio::test]
async fn test_policy_update_applies_to_later_sessions() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();

    let before = kernel.submit(&client.small_request("v1")).await.unwrap();
    assert_eq!(before.policy_version, Some(1));

    let config = PolicyConfig {
        credits_per_second: 1.0,
        ..PolicyConfig::default()
    };
    let policy = kernel.update_policy(config).await.unwrap();
    assert_eq!(policy.version(), 2);

    let after = kernel.submit(&client.small_request("v2")).await.unwrap();
    assert_eq!(after.policy_version, Some(2));
    assert_eq!(after.credits, Credits::from_hundredths(1100));

    let record = kernel
        .session(&client.identity(), &SessionId::from("v1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.policy_version, Some(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_recent_sessions_newest_first() {
    let kernel = sqlite_kernel();
    let client = TestClient::new();

    for name in ["a", "b", "c", "d"] {
        kernel.submit(&client.small_request(name)).await.unwrap();
    }
    let mut rejected = client.small_request("e");
    rejected.bytes_in = Some(1);
    kernel.submit(&rejected).await.unwrap();

    let all = kernel.recent_sessions(&client.identity(), None).await.unwrap();
    let names: Vec<&str> = all.iter().map(|r| r.session_id.as_str()).collect();
    assert_eq!(names, vec!["e", "d", "c", "b", "a"]);
    assert_eq!(all[0].status, SessionStatus::Rejected);

    let two = kernel.recent_sessions(&client.identity(), Some(2)).await.unwrap();
    assert_eq!(two.len(), 2);
    assert_eq!(two[0].session_id.as_str(), "e");
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency and persistence
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_distinct_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("ledger.db")).unwrap();
    let kernel = Arc::new(CreditKernel::with_defaults(store));
    let client = Arc::new(TestClient::new());

    const N: usize = 48;
    let mut handles = Vec::with_capacity(N);
    for i in 0..N {
        let kernel = Arc::clone(&kernel);
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            let request = client.small_request(&format!("c-{}", i));
            kernel.submit(&request).await.unwrap()
        }));
    }

    let mut granted = 0u64;
    for handle in handles {
        let verdict = handle.await.unwrap();
        assert!(verdict.accepted);
        granted += verdict.credits.hundredths();
    }

    let balance = kernel.balance(&client.identity()).await.unwrap();
    let entry = balance.entry().unwrap();
    assert_eq!(entry.balance.hundredths(), granted);
    assert_eq!(entry.balance, Credits::from_hundredths(110 * N as u64));
    assert_eq!(entry.total_sessions, N as u64);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicates_credit_once() {
    let kernel = Arc::new(sqlite_kernel());
    let client = TestClient::new();
    let request = client.small_request("contested");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let kernel = Arc::clone(&kernel);
        let request = request.clone();
        handles.push(tokio::spawn(async move { kernel.submit(&request).await.unwrap() }));
    }

    let mut accepted = 0;
    for handle in handles {
        let verdict = handle.await.unwrap();
        if verdict.accepted {
            accepted += 1;
        } else {
            assert_eq!(verdict.stage(), Some(RejectionStage::Replay));
        }
    }
    assert_eq!(accepted, 1);

    let entry = kernel.balance(&client.identity()).await.unwrap();
    assert_eq!(entry.entry().unwrap().total_sessions, 1);
    assert_eq!(entry.credits(), Credits::from_hundredths(110));
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = LedgerConfig {
        database_path: Some(dir.path().join("ledger.db")),
        ..LedgerConfig::default()
    };
    let client = TestClient::new();
    let request = client.small_request("persisted");

    {
        let kernel = CreditKernel::open(&config).unwrap();
        assert!(kernel.submit(&request).await.unwrap().accepted);
    }

    let kernel = CreditKernel::open(&config).unwrap();
    let balance = kernel.balance(&client.identity()).await.unwrap();
    assert_eq!(balance.credits(), Credits::from_hundredths(110));

    let verdict = kernel.submit(&request).await.unwrap();
    assert_eq!(verdict.stage(), Some(RejectionStage::Replay));
}
