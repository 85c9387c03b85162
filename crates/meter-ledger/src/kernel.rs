//! The credit kernel: unified API over validation, policy, and storage.
//!
//! Each submission moves through the same stages in order: input parsing,
//! replay check, signature verification, policy evaluation, then one atomic
//! write. The first stage that fails decides the verdict.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use meter_ledger_core::{
    parse_request, validate_receipt_structure, ClientIdentity, CreditPolicy, InputLimits,
    PolicyConfig, PolicyOutcome, Receipt, RejectionStage, SessionId, SessionRecord,
    SubmitRequest, ValidationError,
};
use meter_ledger_store::{SqliteStore, Store, StoreExt};

use crate::config::LedgerConfig;
use crate::error::Result;
use crate::verdict::{Balance, Verdict, SIGNATURE_REASON};

/// Default page size for [`CreditKernel::recent_sessions`].
pub const DEFAULT_RECENT_SESSIONS: usize = 50;

/// Configuration for the Kernel.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Bounds on client-supplied input.
    pub limits: InputLimits,
    /// Records returned by `recent_sessions` when no limit is given.
    pub recent_sessions_limit: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            limits: InputLimits::default(),
            recent_sessions_limit: DEFAULT_RECENT_SESSIONS,
        }
    }
}

/// The main Kernel struct.
///
/// Holds no per-session state. The active policy sits behind an async
/// `RwLock`; each submission takes one snapshot and evaluates against it,
/// so a concurrent [`update_policy`](Self::update_policy) never splits a
/// submission across two versions.
pub struct CreditKernel<S: Store> {
    /// The storage backend.
    store: Arc<S>,
    /// Active credit policy.
    policy: RwLock<Arc<CreditPolicy>>,
    /// Configuration.
    config: KernelConfig,
}

impl<S: Store> CreditKernel<S> {
    /// Create a new kernel instance.
    pub fn new(store: S, policy: CreditPolicy, config: KernelConfig) -> Self {
        Self {
            store: Arc::new(store),
            policy: RwLock::new(Arc::new(policy)),
            config,
        }
    }

    /// Kernel with the default policy and limits.
    pub fn with_defaults(store: S) -> Self {
        Self::new(store, CreditPolicy::default(), KernelConfig::default())
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submission
    // ─────────────────────────────────────────────────────────────────────────

    /// Process a raw submission.
    ///
    /// Rejections come back as `Ok(Verdict)`. `Err` means the store failed
    /// and nothing was committed.
    pub async fn submit(&self, request: &SubmitRequest) -> Result<Verdict> {
        match parse_request(request, &self.config.limits) {
            Ok(receipt) => self.process(&receipt).await,
            Err(e) => {
                debug!(session_id = ?request.session_id, error = %e, "malformed submission");
                Ok(Verdict::malformed(request.session_id.clone(), &e))
            }
        }
    }

    /// Process an already-typed receipt.
    pub async fn submit_receipt(&self, receipt: &Receipt) -> Result<Verdict> {
        if let Err(e) = validate_receipt_structure(receipt, &self.config.limits) {
            debug!(session_id = %receipt.session_id(), error = %e, "malformed receipt");
            return Ok(Verdict::malformed(
                Some(receipt.session_id().to_string()),
                &e,
            ));
        }
        self.process(receipt).await
    }

    async fn process(&self, receipt: &Receipt) -> Result<Verdict> {
        let identity = receipt.identity();
        let session_id = receipt.session_id();

        if self.store.has_session(identity, session_id).await? {
            debug!(%identity, %session_id, "replayed session");
            return Ok(Verdict::replay(session_id.as_str()));
        }

        let canonical = match receipt.message() {
            Ok(canonical) => canonical,
            Err(e) => {
                let e = ValidationError::from(e);
                return Ok(Verdict::malformed(Some(session_id.to_string()), &e));
            }
        };

        if identity.verify(&canonical, &receipt.signature).is_err() {
            warn!(%identity, %session_id, "signature verification failed");
            let record = SessionRecord::rejected(
                receipt,
                &canonical,
                RejectionStage::Signature,
                vec![SIGNATURE_REASON.to_string()],
                None,
                now_millis(),
            );
            return self.persist(record).await;
        }
        debug!(%identity, %session_id, "signature verified");

        let policy = self.policy().await;
        let outcome = policy.evaluate(receipt.fields.duration_ms(), receipt.fields.total_bytes());
        let record = if outcome.accepted {
            SessionRecord::accepted(receipt, &canonical, &outcome, policy.version(), now_millis())
        } else {
            debug!(%identity, %session_id, reasons = ?outcome.reasons, "policy rejected session");
            SessionRecord::rejected(
                receipt,
                &canonical,
                RejectionStage::Policy,
                outcome.reasons,
                Some(policy.version()),
                now_millis(),
            )
        };
        self.persist(record).await
    }

    async fn persist(&self, record: SessionRecord) -> Result<Verdict> {
        match self.store.record_verdict(&record).await {
            Ok(Some(entry)) => {
                info!(
                    identity = %record.identity,
                    session_id = %record.session_id,
                    credits = %record.credits_granted,
                    balance = %entry.balance,
                    "session credited"
                );
                Ok(Verdict::from_record(&record))
            }
            Ok(None) => Ok(Verdict::from_record(&record)),
            Err(e) if e.is_already_exists() => {
                // Lost a race with a concurrent submission of the same key.
                warn!(
                    identity = %record.identity,
                    session_id = %record.session_id,
                    "replay detected at commit"
                );
                Ok(Verdict::replay(record.session_id.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Validate and price a submission without recording it.
    ///
    /// Malformed input and bad signatures are errors here, since there is no
    /// verdict to return.
    pub async fn preview(&self, request: &SubmitRequest) -> Result<PolicyOutcome> {
        let receipt = parse_request(request, &self.config.limits)?;
        meter_ledger_core::verify_receipt_signature(&receipt)?;
        let policy = self.policy().await;
        Ok(policy.evaluate(receipt.fields.duration_ms(), receipt.fields.total_bytes()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Current balance for an identity.
    pub async fn balance(&self, identity: &ClientIdentity) -> Result<Balance> {
        Ok(self.store.get_ledger(identity).await?.into())
    }

    /// Look up one session record.
    pub async fn session(
        &self,
        identity: &ClientIdentity,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>> {
        Ok(self.store.get_session(identity, session_id).await?)
    }

    /// An identity's records, newest first.
    pub async fn recent_sessions(
        &self,
        identity: &ClientIdentity,
        limit: Option<usize>,
    ) -> Result<Vec<SessionRecord>> {
        let limit = limit.unwrap_or(self.config.recent_sessions_limit);
        Ok(self.store.list_sessions(identity, limit).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Policy
    // ─────────────────────────────────────────────────────────────────────────

    /// The active policy.
    pub async fn policy(&self) -> Arc<CreditPolicy> {
        self.policy.read().await.clone()
    }

    /// Replace the active policy with the next version.
    ///
    /// Submissions already past their policy snapshot finish under the old
    /// version.
    pub async fn update_policy(&self, config: PolicyConfig) -> Result<Arc<CreditPolicy>> {
        let mut active = self.policy.write().await;
        let next = Arc::new(CreditPolicy::from_config(
            config,
            active.version().saturating_add(1),
        )?);
        *active = next.clone();
        info!(version = next.version(), "credit policy updated");
        Ok(next)
    }
}

impl CreditKernel<SqliteStore> {
    /// Open the store and policy a [`LedgerConfig`] describes.
    pub fn open(config: &LedgerConfig) -> Result<Self> {
        config.validate()?;
        let store = match &config.database_path {
            Some(path) => SqliteStore::open(path)?,
            None => SqliteStore::open_memory()?,
        };
        Ok(Self::new(
            store,
            config.initial_policy()?,
            config.kernel_config(),
        ))
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
