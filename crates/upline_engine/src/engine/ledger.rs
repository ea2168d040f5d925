//! Commission persistence and balance aggregation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::hierarchy::MAX_HIERARCHY_DEPTH;
use super::model::{Commission, NewCommission};
use super::plan::BPS_DENOMINATOR;
use super::store::AffiliateStore;
use super::types::{CommissionId, Level};
use super::util::settlement_hash;

/// Per-level record in a distribution outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommissionLine {
    pub level: Level,
    pub affiliate_id: String,
    pub amount_cents: i64,
    /// Present when a commission was persisted for this level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_id: Option<CommissionId>,
    /// Present when the level produced nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<LineSkip>,
}

/// Why a walked level produced no commission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LineSkip {
    /// The plan pays nothing at this level.
    ZeroAmount,
    /// The receiver's rate floored the share to nothing.
    ZeroRate,
    /// Inactivity decay reduced the share to nothing.
    DecayedToZero,
}

/// Single write path for commissions and affiliate balance aggregates.
///
/// Engines compute amounts; the ledger checks each line and hands it to the
/// store. Balances only ever grow here. Payouts and manual corrections are
/// someone else's job.
pub struct CommissionLedger {
    store: Arc<dyn AffiliateStore>,
}

impl CommissionLedger {
    pub fn new(store: Arc<dyn AffiliateStore>) -> Self {
        Self { store }
    }

    /// Persist one commission line.
    pub fn create(&self, line: NewCommission) -> Result<Commission, EngineError> {
        if line.level == 0 || line.level > MAX_HIERARCHY_DEPTH {
            return Err(EngineError::CommissionInvalid {
                reason: format!("level out of range: {}", line.level),
            });
        }
        if line.amount_cents < 0 || line.base_amount_cents < 0 {
            return Err(EngineError::CommissionInvalid {
                reason: format!("negative amount for affiliate {}", line.affiliate_id),
            });
        }
        if let Some(rate_bps) = line.rate_bps {
            if i64::from(rate_bps) > BPS_DENOMINATOR {
                return Err(EngineError::CommissionInvalid {
                    reason: format!("rate above 100%: {rate_bps} bps"),
                });
            }
        }
        self.store.insert_commission(line)
    }

    /// Add to an affiliate's balance aggregates. Deltas must be >= 0.
    pub fn credit(
        &self,
        affiliate_id: &str,
        available_delta_cents: i64,
        lifetime_delta_cents: i64,
    ) -> Result<(), EngineError> {
        if available_delta_cents < 0 || lifetime_delta_cents < 0 {
            return Err(EngineError::CommissionInvalid {
                reason: format!("negative credit for affiliate {affiliate_id}"),
            });
        }
        self.store
            .credit_balances(affiliate_id, available_delta_cents, lifetime_delta_cents)
    }

    /// Shift an affiliate's negative carryover. Returns the new value, never
    /// below zero.
    pub fn adjust_carryover(
        &self,
        affiliate_id: &str,
        delta_cents: i64,
    ) -> Result<i64, EngineError> {
        self.store.adjust_carryover(affiliate_id, delta_cents)
    }

    pub fn record_validated_referral(&self, affiliate_id: &str) -> Result<u32, EngineError> {
        self.store.increment_validated_referrals(affiliate_id)
    }

    pub fn set_tier(
        &self,
        affiliate_id: &str,
        tier: &str,
        tier_level: u8,
    ) -> Result<(), EngineError> {
        self.store.set_tier(affiliate_id, tier, tier_level)
    }
}

/// Hash witnessing what one distribution paid: only the persisted lines,
/// keyed by level, receiver and amount. Store-assigned ids stay out so two
/// runs over the same inputs agree.
pub(crate) fn lines_digest(
    kind: &str,
    scope: &str,
    base_cents: i64,
    lines: &[CommissionLine],
) -> Result<String, EngineError> {
    #[derive(Serialize)]
    struct DigestLine<'a> {
        level: Level,
        affiliate_id: &'a str,
        amount_cents: i64,
    }
    #[derive(Serialize)]
    struct Digest<'a> {
        kind: &'a str,
        scope: &'a str,
        base_cents: i64,
        lines: Vec<DigestLine<'a>>,
    }

    let digest = Digest {
        kind,
        scope,
        base_cents,
        lines: lines
            .iter()
            .filter(|line| line.commission_id.is_some())
            .map(|line| DigestLine {
                level: line.level,
                affiliate_id: &line.affiliate_id,
                amount_cents: line.amount_cents,
            })
            .collect(),
    };
    settlement_hash(&digest)
}
