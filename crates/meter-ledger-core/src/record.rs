//! Session records: the server's terminal verdict on one submission.
//!
//! A record is written exactly once, with its verdict attached, and never
//! rewritten. Its `(identity, session_id)` key is the replay key.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Blake3Hash, ClientIdentity, Ed25519Signature};
use crate::policy::{CreditBreakdown, PolicyOutcome};
use crate::receipt::Receipt;
use crate::types::{Credits, SessionId};

/// Final status of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Accepted,
    Rejected,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Accepted => "accepted",
            SessionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(SessionStatus::Accepted),
            "rejected" => Some(SessionStatus::Rejected),
            _ => None,
        }
    }
}

/// The pipeline stage at which a submission was rejected.
///
/// Only `Signature` and `Policy` rejections are ever persisted. `Malformed`
/// input has no trustworthy key, and a `Replay` key already has a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RejectionStage {
    Malformed = 1,
    Replay = 2,
    Signature = 3,
    Policy = 4,
}

impl RejectionStage {
    /// Convert to u8 for storage.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from u8.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Malformed),
            2 => Some(Self::Replay),
            3 => Some(Self::Signature),
            4 => Some(Self::Policy),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Replay => "replay",
            Self::Signature => "signature",
            Self::Policy => "policy",
        }
    }
}

impl fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted submission and its verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub identity: ClientIdentity,
    pub session_id: SessionId,

    pub start_ts: i64,
    pub end_ts: i64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub auxiliary_port: Option<u16>,
    pub signature: Ed25519Signature,

    pub status: SessionStatus,
    pub rejection_stage: Option<RejectionStage>,
    /// Rejection reasons, or informational notes on acceptance.
    pub reasons: Vec<String>,

    /// Zero unless accepted.
    pub credits_granted: Credits,
    pub breakdown: Option<CreditBreakdown>,
    /// Policy the receipt was evaluated under. None if it never got that far.
    pub policy_version: Option<u32>,

    /// Blake3 of the canonical signed bytes.
    pub canonical_hash: Blake3Hash,
    pub canonical_len: u32,

    /// Server time of the verdict (Unix milliseconds).
    pub created_at: i64,
}

impl SessionRecord {
    fn from_receipt(
        receipt: &Receipt,
        canonical: &[u8],
        status: SessionStatus,
        created_at: i64,
    ) -> Self {
        let fields = &receipt.fields;
        Self {
            identity: fields.identity,
            session_id: fields.session_id.clone(),
            start_ts: fields.start_ts,
            end_ts: fields.end_ts,
            bytes_in: fields.bytes_in,
            bytes_out: fields.bytes_out,
            auxiliary_port: receipt.auxiliary_port,
            signature: receipt.signature,
            status,
            rejection_stage: None,
            reasons: Vec::new(),
            credits_granted: Credits::ZERO,
            breakdown: None,
            policy_version: None,
            canonical_hash: Blake3Hash::hash(canonical),
            canonical_len: u32::try_from(canonical.len()).unwrap_or(u32::MAX),
            created_at,
        }
    }

    /// Record for a receipt the policy accepted.
    pub fn accepted(
        receipt: &Receipt,
        canonical: &[u8],
        outcome: &PolicyOutcome,
        policy_version: u32,
        created_at: i64,
    ) -> Self {
        Self {
            reasons: outcome.reasons.clone(),
            credits_granted: outcome.credits,
            breakdown: outcome.breakdown.clone(),
            policy_version: Some(policy_version),
            ..Self::from_receipt(receipt, canonical, SessionStatus::Accepted, created_at)
        }
    }

    /// Record for a rejected receipt.
    pub fn rejected(
        receipt: &Receipt,
        canonical: &[u8],
        stage: RejectionStage,
        reasons: Vec<String>,
        policy_version: Option<u32>,
        created_at: i64,
    ) -> Self {
        Self {
            rejection_stage: Some(stage),
            reasons,
            policy_version,
            ..Self::from_receipt(receipt, canonical, SessionStatus::Rejected, created_at)
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == SessionStatus::Accepted
    }

    pub fn duration_ms(&self) -> i64 {
        self.end_ts.saturating_sub(self.start_ts)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms() as f64 / 1000.0
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Keypair;
    use crate::policy::CreditPolicy;
    use crate::receipt::ReceiptBuilder;

    fn receipt() -> Receipt {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        ReceiptBuilder::new(keypair.identity(), "session-0001")
            .window(0, 11_000)
            .bytes(600, 600)
            .auxiliary_port(9050)
            .sign(&keypair)
            .unwrap()
    }

    #[test]
    fn test_stage_roundtrip() {
        for stage in [
            RejectionStage::Malformed,
            RejectionStage::Replay,
            RejectionStage::Signature,
            RejectionStage::Policy,
        ] {
            assert_eq!(RejectionStage::from_u8(stage.to_u8()), Some(stage));
        }
        assert_eq!(RejectionStage::from_u8(0), None);
        assert_eq!(SessionStatus::parse("accepted"), Some(SessionStatus::Accepted));
        assert_eq!(SessionStatus::parse("nope"), None);
    }

    #[test]
    fn test_accepted_record() {
        let receipt = receipt();
        let canonical = receipt.message().unwrap();
        let outcome = CreditPolicy::default().evaluate(11_000, 1200);
        let record = SessionRecord::accepted(&receipt, &canonical, &outcome, 1, 5_000);

        assert!(record.is_accepted());
        assert_eq!(record.credits_granted.hundredths(), 110);
        assert_eq!(record.rejection_stage, None);
        assert_eq!(record.policy_version, Some(1));
        assert_eq!(record.auxiliary_port, Some(9050));
        assert_eq!(record.duration_seconds(), 11.0);
        assert_eq!(record.total_bytes(), 1200);
        assert_eq!(record.canonical_hash, Blake3Hash::hash(&canonical));
        assert_eq!(record.canonical_len as usize, canonical.len());
    }

    #[test]
    fn test_rejected_record_grants_nothing() {
        let receipt = receipt();
        let canonical = receipt.message().unwrap();
        let record = SessionRecord::rejected(
            &receipt,
            &canonical,
            RejectionStage::Signature,
            vec!["signature verification failed".into()],
            None,
            5_000,
        );
        assert!(!record.is_accepted());
        assert_eq!(record.credits_granted, Credits::ZERO);
        assert_eq!(record.rejection_stage, Some(RejectionStage::Signature));
        assert!(record.breakdown.is_none());
    }

    #[test]
    fn test_stage_serde_names() {
        let json = serde_json::to_string(&RejectionStage::Policy).unwrap();
        assert_eq!(json, "\"policy\"");
        assert_eq!(RejectionStage::Replay.to_string(), "replay");
    }
}
