//! Verdicts and query results handed back to the transport layer.

use serde::{Deserialize, Serialize};

use meter_ledger_core::{
    CreditBreakdown, Credits, LedgerEntry, RejectionStage, SessionRecord, ValidationError,
};

/// Reason text for a repeated `(identity, session_id)`.
pub const REPLAY_REASON: &str = "Session replay detected: this session was already submitted";

/// Reason text for a signature that does not verify.
pub const SIGNATURE_REASON: &str = "Invalid signature";

/// Why a submission was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub stage: RejectionStage,
    pub reasons: Vec<String>,
}

/// The outcome of one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    /// Absent only when the submission carried no session id at all.
    pub session_id: Option<String>,
    pub credits: Credits,
    pub breakdown: Option<CreditBreakdown>,
    pub policy_version: Option<u32>,
    /// Informational notes on an accepted session, such as the cap.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    pub rejection: Option<Rejection>,
}

impl Verdict {
    /// A rejection that never reached storage.
    pub fn rejected(
        session_id: Option<String>,
        stage: RejectionStage,
        reasons: Vec<String>,
    ) -> Self {
        Self {
            accepted: false,
            session_id,
            credits: Credits::ZERO,
            breakdown: None,
            policy_version: None,
            notes: Vec::new(),
            rejection: Some(Rejection { stage, reasons }),
        }
    }

    pub fn malformed(session_id: Option<String>, error: &ValidationError) -> Self {
        Self::rejected(session_id, RejectionStage::Malformed, vec![error.to_string()])
    }

    pub fn replay(session_id: impl Into<String>) -> Self {
        Self::rejected(
            Some(session_id.into()),
            RejectionStage::Replay,
            vec![REPLAY_REASON.to_string()],
        )
    }

    /// The verdict a persisted record stands for.
    pub fn from_record(record: &SessionRecord) -> Self {
        let session_id = Some(record.session_id.to_string());
        match record.rejection_stage {
            Some(stage) if !record.is_accepted() => Self {
                policy_version: record.policy_version,
                ..Self::rejected(session_id, stage, record.reasons.clone())
            },
            _ => Self {
                accepted: true,
                session_id,
                credits: record.credits_granted,
                breakdown: record.breakdown.clone(),
                policy_version: record.policy_version,
                notes: record.reasons.clone(),
                rejection: None,
            },
        }
    }

    pub fn stage(&self) -> Option<RejectionStage> {
        self.rejection.as_ref().map(|r| r.stage)
    }

    pub fn reasons(&self) -> &[String] {
        self.rejection
            .as_ref()
            .map(|r| r.reasons.as_slice())
            .unwrap_or(&[])
    }
}

/// Result of a balance query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Balance {
    Entry(LedgerEntry),
    /// The identity has never had a receipt accepted.
    NoEntry,
}

impl Balance {
    pub fn entry(&self) -> Option<&LedgerEntry> {
        match self {
            Balance::Entry(entry) => Some(entry),
            Balance::NoEntry => None,
        }
    }

    /// Current balance, zero when there is no entry.
    pub fn credits(&self) -> Credits {
        self.entry().map_or(Credits::ZERO, |e| e.balance)
    }
}

impl From<Option<LedgerEntry>> for Balance {
    fn from(entry: Option<LedgerEntry>) -> Self {
        entry.map_or(Balance::NoEntry, Balance::Entry)
    }
}
