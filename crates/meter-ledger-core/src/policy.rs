//! Credit policy: session metrics in, credits out.
//!
//! Evaluation is pure. The same policy version and the same inputs always
//! produce the same outcome, so a stored record can be re-derived later.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::Credits;

/// Bytes in one mebibyte, the unit of the byte rate.
pub const BYTES_PER_MIB: f64 = 1_048_576.0;

/// Tunable policy parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub min_duration_seconds: f64,
    pub min_bytes_total: u64,
    pub credits_per_second: f64,
    pub credits_per_mib: f64,
    pub max_credits_per_session: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_duration_seconds: 10.0,
            min_bytes_total: 1024,
            credits_per_second: 0.1,
            credits_per_mib: 0.5,
            max_credits_per_session: 100.0,
        }
    }
}

impl PolicyConfig {
    fn validate(&self) -> Result<(), PolicyError> {
        for (field, value) in [
            ("min_duration_seconds", self.min_duration_seconds),
            ("credits_per_second", self.credits_per_second),
            ("credits_per_mib", self.credits_per_mib),
            ("max_credits_per_session", self.max_credits_per_session),
        ] {
            if !value.is_finite() {
                return Err(PolicyError::NonFinite(field));
            }
            if value < 0.0 {
                return Err(PolicyError::Negative { field, value });
            }
        }
        if self.max_credits_per_session <= 0.0 {
            return Err(PolicyError::NonPositiveCap);
        }

        // Every component and their sum must stay finite for any metrics
        // evaluate can be handed.
        let max_duration = self.credits_per_second * (i64::MAX as f64 / 1000.0);
        if !max_duration.is_finite() {
            return Err(PolicyError::RateOverflow("credits_per_second"));
        }
        let max_bytes = self.credits_per_mib * (u64::MAX as f64 / BYTES_PER_MIB);
        if !max_bytes.is_finite() {
            return Err(PolicyError::RateOverflow("credits_per_mib"));
        }
        if !(max_duration + max_bytes).is_finite() {
            return Err(PolicyError::RateOverflow("credits_per_second"));
        }
        Ok(())
    }
}

/// A validated, versioned policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditPolicy {
    version: u32,
    #[serde(flatten)]
    config: PolicyConfig,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            version: 1,
            config: PolicyConfig::default(),
        }
    }
}

impl CreditPolicy {
    /// Build a policy, rejecting non-finite or negative parameters and rates
    /// that could overflow.
    pub fn from_config(config: PolicyConfig, version: u32) -> Result<Self, PolicyError> {
        config.validate()?;
        Ok(Self { version, config })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Evaluate a session's metrics.
    ///
    /// Both minimum checks always run, and every failing one contributes a
    /// reason. An accepted session earns duration credits plus byte credits,
    /// clamped to the per-session cap and rounded half-up to hundredths.
    pub fn evaluate(&self, duration_ms: i64, total_bytes: u64) -> PolicyOutcome {
        let cfg = &self.config;
        let duration_seconds = duration_ms as f64 / 1000.0;
        let mut reasons = Vec::new();

        if duration_seconds < cfg.min_duration_seconds {
            reasons.push(format!(
                "Duration {:.2}s is below minimum {}s",
                duration_seconds, cfg.min_duration_seconds
            ));
        }
        if total_bytes < cfg.min_bytes_total {
            reasons.push(format!(
                "Total bytes {} is below minimum {}",
                total_bytes, cfg.min_bytes_total
            ));
        }
        if !reasons.is_empty() {
            return PolicyOutcome {
                accepted: false,
                reasons,
                credits: Credits::ZERO,
                breakdown: None,
            };
        }

        let duration_credits = duration_seconds * cfg.credits_per_second;
        let byte_credits = (total_bytes as f64 / BYTES_PER_MIB) * cfg.credits_per_mib;
        let sum = duration_credits + byte_credits;

        let (uncapped, capped_from) = if sum >= cfg.max_credits_per_session {
            reasons.push(format!(
                "Credits capped from {} to {}",
                sum, cfg.max_credits_per_session
            ));
            (cfg.max_credits_per_session, Some(sum))
        } else {
            (sum, None)
        };

        let credits = Credits::from_f64_half_up(uncapped);
        PolicyOutcome {
            accepted: true,
            reasons,
            credits,
            breakdown: Some(CreditBreakdown {
                duration_credits,
                byte_credits,
                cap_applied: capped_from.is_some(),
                capped_from,
                total: credits,
            }),
        }
    }
}

/// How an accepted session's credits were computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBreakdown {
    pub duration_credits: f64,
    pub byte_credits: f64,
    pub cap_applied: bool,
    /// Pre-clamp sum when the cap applied.
    pub capped_from: Option<f64>,
    pub total: Credits,
}

/// Result of evaluating a session under a policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutcome {
    pub accepted: bool,
    /// Rejection reasons, or informational notes (the cap) on acceptance.
    pub reasons: Vec<String>,
    pub credits: Credits,
    /// Present only when accepted.
    pub breakdown: Option<CreditBreakdown>,
}
