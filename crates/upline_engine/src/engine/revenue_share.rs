//! Periodic revenue share distribution.
//!
//! Each calendar month, a source affiliate's referred customers produce a
//! net gaming revenue (NGR). Losses accrue as negative carryover; profitable
//! months pay the carryover down first and only the remainder is shared up
//! the sponsor chain. Every receiver is paid at their own tier's rate,
//! reduced by their own inactivity decay. The `(source, period)` claim in
//! the store keeps each month settling at most once.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::events::{EngineEvent, EventBus};
use super::hierarchy::HierarchyWalker;
use super::ledger::{lines_digest, CommissionLedger, CommissionLine, LineSkip};
use super::model::{
    CommissionKind, NewCommission, Transaction, TransactionKind, TransactionStatus,
};
use super::period::Period;
use super::plan::{CommissionPlan, BPS_DENOMINATOR};
use super::store::AffiliateStore;
use super::types::{Level, UnixMillis};
use super::util::{read_json_from_path, write_json_to_path};

/// Why `distribute` finished without creating commissions. Only the claim
/// was recorded; all three cases are safe to observe on a retry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum DistributionSkip {
    AlreadyProcessed,
    /// NGR at or below zero. Its absolute value accrued to the carryover.
    NegativeNgr,
    /// Positive NGR fully consumed by existing carryover.
    CarryoverAbsorbed,
}

/// Everything one `distribute` call did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DistributionOutcome {
    /// The source affiliate whose customers produced the revenue.
    pub affiliate_id: String,
    pub period: Period,
    pub ngr_cents: i64,
    pub carryover_before_cents: i64,
    pub carryover_after_cents: i64,
    /// NGR remaining after the carryover offset; the base every rate was
    /// applied to.
    pub adjusted_ngr_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<DistributionSkip>,
    pub lines: Vec<CommissionLine>,
    pub walked_levels: Level,
    pub max_levels: Level,
    pub distributed_cents: i64,
    pub events_published: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_hash: Option<String>,
}

impl DistributionOutcome {
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        read_json_from_path(path.as_ref())
    }
}

/// One failed source in a batch run.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub affiliate_id: String,
    pub error: EngineError,
}

/// Per-source outcomes of one batch run. A failing source never stops the
/// rest of the batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub period: Period,
    pub outcomes: Vec<DistributionOutcome>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn total_distributed_cents(&self) -> i64 {
        self.outcomes
            .iter()
            .fold(0i64, |total, outcome| {
                total.saturating_add(outcome.distributed_cents)
            })
    }
}

/// Net gaming revenue over a set of transactions: completed deposits minus
/// completed withdrawals minus completed bonuses. Pending and cancelled
/// rows never count; bets and raw gaming rows are activity, not money.
pub fn net_gaming_revenue(transactions: &[Transaction]) -> i64 {
    let mut total: i64 = 0;
    for tx in transactions {
        if tx.status != TransactionStatus::Completed {
            continue;
        }
        match tx.kind {
            TransactionKind::Deposit => total = total.saturating_add(tx.amount_cents),
            TransactionKind::Withdrawal | TransactionKind::Bonus => {
                total = total.saturating_sub(tx.amount_cents)
            }
            TransactionKind::Bet | TransactionKind::Ggr => {}
        }
    }
    total
}

/// One receiver's share: integer-floor rate application, then the decay
/// reduction on top. Never negative.
fn level_share_cents(adjusted_ngr_cents: i64, rate_bps: u32, decay_reduction_bps: u32) -> i64 {
    let raw = adjusted_ngr_cents.saturating_mul(i64::from(rate_bps)) / BPS_DENOMINATOR;
    let reduction = raw.saturating_mul(i64::from(decay_reduction_bps)) / BPS_DENOMINATOR;
    raw.saturating_sub(reduction)
}

/// Distributes monthly revenue share for source affiliates.
pub struct RevenueShareEngine {
    plan: CommissionPlan,
    store: Arc<dyn AffiliateStore>,
    bus: Arc<dyn EventBus>,
    ledger: CommissionLedger,
    walker: HierarchyWalker,
}

impl RevenueShareEngine {
    /// Rejects invalid plans so distribution code never sees one.
    pub fn new(
        plan: CommissionPlan,
        store: Arc<dyn AffiliateStore>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, EngineError> {
        let report = plan.validate();
        if !report.is_ok() {
            return Err(EngineError::PlanInvalid {
                violations: report.violations,
            });
        }
        let walker = HierarchyWalker::new(plan.max_levels);
        let ledger = CommissionLedger::new(store.clone());
        Ok(Self {
            plan,
            store,
            bus,
            ledger,
            walker,
        })
    }

    pub fn plan(&self) -> &CommissionPlan {
        &self.plan
    }

    /// NGR of the affiliate's referred customers over one period. Pure
    /// aggregation; nothing is written.
    pub fn compute_ngr(&self, affiliate_id: &str, period: Period) -> Result<i64, EngineError> {
        let transactions = self.store.transactions_for_referrer_in_range(
            affiliate_id,
            period.start_unix_ms(),
            period.end_unix_ms(),
        )?;
        Ok(net_gaming_revenue(&transactions))
    }

    /// Settle one source affiliate's period.
    ///
    /// At most one call per `(source, period)` ever reaches the ledger; the
    /// rest observe an `AlreadyProcessed` skip. Loss months accrue
    /// carryover, profitable months pay it down before anything is shared.
    pub fn distribute(
        &self,
        affiliate_id: &str,
        period: Period,
        now_unix_ms: UnixMillis,
    ) -> Result<DistributionOutcome, EngineError> {
        let Some(source) = self.store.affiliate(affiliate_id)? else {
            return Err(EngineError::AffiliateNotFound {
                affiliate_id: affiliate_id.to_string(),
            });
        };
        let max_levels = self.walker.max_levels();

        // The claim decides which caller settles this period.
        if !self.store.try_claim_revshare_period(affiliate_id, period)? {
            return Ok(self.skipped_outcome(
                affiliate_id,
                period,
                0,
                source.negative_carryover_cents,
                source.negative_carryover_cents,
                DistributionSkip::AlreadyProcessed,
                0,
            ));
        }

        let ngr_cents = self.compute_ngr(affiliate_id, period)?;
        let carryover_before_cents = source.negative_carryover_cents;
        let mut events_published = 0usize;

        if ngr_cents <= 0 {
            let mut carryover_after_cents = carryover_before_cents;
            if ngr_cents < 0 {
                carryover_after_cents = self
                    .ledger
                    .adjust_carryover(affiliate_id, ngr_cents.saturating_abs())?;
                if self.publish_carryover(
                    affiliate_id,
                    period,
                    ngr_cents,
                    carryover_before_cents,
                    carryover_after_cents,
                ) {
                    events_published += 1;
                }
            }
            return Ok(self.skipped_outcome(
                affiliate_id,
                period,
                ngr_cents,
                carryover_before_cents,
                carryover_after_cents,
                DistributionSkip::NegativeNgr,
                events_published,
            ));
        }

        // A profitable month pays the debt first.
        let mut adjusted_ngr_cents = ngr_cents;
        let mut carryover_after_cents = carryover_before_cents;
        if carryover_before_cents > 0 {
            let offset = carryover_before_cents.min(ngr_cents);
            carryover_after_cents = self.ledger.adjust_carryover(affiliate_id, -offset)?;
            adjusted_ngr_cents = ngr_cents - offset;
            if self.publish_carryover(
                affiliate_id,
                period,
                ngr_cents,
                carryover_before_cents,
                carryover_after_cents,
            ) {
                events_published += 1;
            }
            if adjusted_ngr_cents == 0 {
                return Ok(self.skipped_outcome(
                    affiliate_id,
                    period,
                    ngr_cents,
                    carryover_before_cents,
                    carryover_after_cents,
                    DistributionSkip::CarryoverAbsorbed,
                    events_published,
                ));
            }
        }

        let steps = self.walker.walk(self.store.as_ref(), affiliate_id)?;
        let mut lines = Vec::with_capacity(steps.len());
        let mut distributed_cents: i64 = 0;
        for step in &steps {
            // Each receiver is paid at their own tier and their own decay.
            let row = self.plan.require_tier(step.affiliate.validated_referrals)?;
            let rate_bps = row.revshare_rate_bps(step.level);
            let raw_cents =
                adjusted_ngr_cents.saturating_mul(i64::from(rate_bps)) / BPS_DENOMINATOR;
            if raw_cents == 0 {
                lines.push(CommissionLine {
                    level: step.level,
                    affiliate_id: step.affiliate.affiliate_id.clone(),
                    amount_cents: 0,
                    commission_id: None,
                    skipped: Some(LineSkip::ZeroRate),
                });
                continue;
            }

            let decay_reduction_bps = self
                .plan
                .decay_reduction_bps(step.affiliate.days_inactive(now_unix_ms));
            let amount_cents =
                level_share_cents(adjusted_ngr_cents, rate_bps, decay_reduction_bps);
            if amount_cents == 0 {
                lines.push(CommissionLine {
                    level: step.level,
                    affiliate_id: step.affiliate.affiliate_id.clone(),
                    amount_cents: 0,
                    commission_id: None,
                    skipped: Some(LineSkip::DecayedToZero),
                });
                continue;
            }

            let source_affiliate_id = (step.level > 1).then(|| affiliate_id.to_string());
            let commission = self.ledger.create(NewCommission {
                affiliate_id: step.affiliate.affiliate_id.clone(),
                source_affiliate_id,
                referral_id: None,
                kind: CommissionKind::Revshare,
                level: step.level,
                base_amount_cents: adjusted_ngr_cents,
                rate_bps: Some(rate_bps),
                amount_cents,
                period: Some(period),
                created_at_unix_ms: now_unix_ms,
            })?;
            self.ledger
                .credit(&commission.affiliate_id, amount_cents, amount_cents)?;
            distributed_cents = distributed_cents.saturating_add(amount_cents);

            if self
                .bus
                .publish(&EngineEvent::CommissionCalculated {
                    commission_id: commission.commission_id,
                    affiliate_id: commission.affiliate_id.clone(),
                    source_affiliate_id: commission.source_affiliate_id.clone(),
                    referral_id: None,
                    kind: CommissionKind::Revshare,
                    level: commission.level,
                    amount_cents: commission.amount_cents,
                    period: Some(period),
                })
                .is_ok()
            {
                events_published += 1;
            }

            lines.push(CommissionLine {
                level: commission.level,
                affiliate_id: commission.affiliate_id.clone(),
                amount_cents: commission.amount_cents,
                commission_id: Some(commission.commission_id),
                skipped: None,
            });
        }

        let levels_paid = lines
            .iter()
            .filter(|line| line.commission_id.is_some())
            .count() as Level;
        let settlement_hash = lines_digest(
            "revshare",
            &format!("{affiliate_id}|{period}"),
            adjusted_ngr_cents,
            &lines,
        )?;
        if self
            .bus
            .publish(&EngineEvent::RevenueShareSettled {
                affiliate_id: affiliate_id.to_string(),
                period,
                adjusted_ngr_cents,
                distributed_cents,
                levels_paid,
                settlement_hash: settlement_hash.clone(),
            })
            .is_ok()
        {
            events_published += 1;
        }

        Ok(DistributionOutcome {
            affiliate_id: affiliate_id.to_string(),
            period,
            ngr_cents,
            carryover_before_cents,
            carryover_after_cents,
            adjusted_ngr_cents,
            skipped: None,
            walked_levels: steps.len() as Level,
            max_levels,
            lines,
            distributed_cents,
            events_published,
            settlement_hash: Some(settlement_hash),
        })
    }

    /// Settle one period for many sources. Failures are collected, never
    /// propagated, so one bad source cannot hold up the month.
    pub fn distribute_batch(
        &self,
        affiliate_ids: &[String],
        period: Period,
        now_unix_ms: UnixMillis,
    ) -> BatchReport {
        let mut outcomes = Vec::with_capacity(affiliate_ids.len());
        let mut failures = Vec::new();
        for affiliate_id in affiliate_ids {
            match self.distribute(affiliate_id, period, now_unix_ms) {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => failures.push(BatchFailure {
                    affiliate_id: affiliate_id.clone(),
                    error,
                }),
            }
        }
        BatchReport {
            period,
            outcomes,
            failures,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn skipped_outcome(
        &self,
        affiliate_id: &str,
        period: Period,
        ngr_cents: i64,
        carryover_before_cents: i64,
        carryover_after_cents: i64,
        skip: DistributionSkip,
        events_published: usize,
    ) -> DistributionOutcome {
        DistributionOutcome {
            affiliate_id: affiliate_id.to_string(),
            period,
            ngr_cents,
            carryover_before_cents,
            carryover_after_cents,
            adjusted_ngr_cents: 0,
            skipped: Some(skip),
            lines: Vec::new(),
            walked_levels: 0,
            max_levels: self.walker.max_levels(),
            distributed_cents: 0,
            events_published,
            settlement_hash: None,
        }
    }

    fn publish_carryover(
        &self,
        affiliate_id: &str,
        period: Period,
        ngr_cents: i64,
        carryover_before_cents: i64,
        carryover_after_cents: i64,
    ) -> bool {
        self.bus
            .publish(&EngineEvent::CarryoverAdjusted {
                affiliate_id: affiliate_id.to_string(),
                period,
                ngr_cents,
                carryover_before_cents,
                carryover_after_cents,
            })
            .is_ok()
    }
}
