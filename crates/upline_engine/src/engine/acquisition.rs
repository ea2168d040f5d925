//! One-time acquisition (CPA) bonus distribution.
//!
//! A referral qualifies once, on its first deposit meeting the plan's
//! eligibility model. The bonus then travels up the sponsor chain with a
//! fixed per-level amount from the acquiring affiliate's tier row. The
//! `cpa_processed` flip in the store is what keeps retries and concurrent
//! calls from paying twice.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::events::{EngineEvent, EventBus};
use super::hierarchy::HierarchyWalker;
use super::ledger::{lines_digest, CommissionLedger, CommissionLine, LineSkip};
use super::model::{
    CommissionKind, NewCommission, Referral, Transaction, TransactionKind, TransactionStatus,
};
use super::plan::{CommissionPlan, CpaModel};
use super::store::AffiliateStore;
use super::types::{Level, UnixMillis};
use super::util::{read_json_from_path, write_json_to_path};

/// Result of evaluating a referral against the plan's eligibility model.
/// Produced without touching any state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityDecision {
    pub eligible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifying_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifying_deposit_cents: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EligibilityDecision {
    fn satisfied(deposit: &Transaction) -> Self {
        Self {
            eligible: true,
            qualifying_transaction_id: Some(deposit.transaction_id.clone()),
            qualifying_deposit_cents: Some(deposit.amount_cents),
            reason: None,
        }
    }

    fn unsatisfied(reason: impl Into<String>) -> Self {
        Self {
            eligible: false,
            qualifying_transaction_id: None,
            qualifying_deposit_cents: None,
            reason: Some(reason.into()),
        }
    }
}

/// Why `process` finished without distributing. Both cases leave every
/// record untouched, so callers may retry freely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum AcquisitionSkip {
    AlreadyProcessed,
    NotEligible { reason: String },
}

/// The acquiring affiliate's referral count and tier after a distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TierUpdate {
    pub validated_referrals: u32,
    pub tier: String,
    pub tier_level: u8,
    pub promoted: bool,
}

/// Everything one `process` call did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcquisitionOutcome {
    pub referral_id: String,
    /// The acquiring (direct) affiliate.
    pub affiliate_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<AcquisitionSkip>,
    pub lines: Vec<CommissionLine>,
    /// Levels the walk actually visited; levels beyond this had no sponsor.
    pub walked_levels: Level,
    pub max_levels: Level,
    pub total_cents: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier_update: Option<TierUpdate>,
    pub events_published: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_hash: Option<String>,
}

impl AcquisitionOutcome {
    fn skipped(referral: &Referral, skip: AcquisitionSkip, max_levels: Level) -> Self {
        Self {
            referral_id: referral.referral_id.clone(),
            affiliate_id: referral.affiliate_id.clone(),
            skipped: Some(skip),
            lines: Vec::new(),
            walked_levels: 0,
            max_levels,
            total_cents: 0,
            tier_update: None,
            events_published: 0,
            settlement_hash: None,
        }
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        write_json_to_path(self, path.as_ref())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        read_json_from_path(path.as_ref())
    }
}

/// Distributes the one-time acquisition bonus for validated referrals.
pub struct AcquisitionEngine {
    plan: CommissionPlan,
    store: Arc<dyn AffiliateStore>,
    bus: Arc<dyn EventBus>,
    ledger: CommissionLedger,
    walker: HierarchyWalker,
}

impl AcquisitionEngine {
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

    /// Evaluate eligibility without changing any state. Fails closed: a
    /// referral whose bonus already went out reports not eligible.
    pub fn validate(&self, referral_id: &str) -> Result<EligibilityDecision, EngineError> {
        let Some(referral) = self.store.referral(referral_id)? else {
            return Err(EngineError::ReferralNotFound {
                referral_id: referral_id.to_string(),
            });
        };
        if referral.cpa_processed {
            return Ok(EligibilityDecision::unsatisfied("referral already processed"));
        }
        self.evaluate(&referral)
    }

    /// Distribute the acquisition bonus for one referral.
    ///
    /// Ineligible and already-processed referrals return a skipped outcome,
    /// not an error. Exactly one call ever reaches the ledger for a given
    /// referral.
    pub fn process(
        &self,
        referral_id: &str,
        now_unix_ms: UnixMillis,
    ) -> Result<AcquisitionOutcome, EngineError> {
        let Some(referral) = self.store.referral(referral_id)? else {
            return Err(EngineError::ReferralNotFound {
                referral_id: referral_id.to_string(),
            });
        };
        let max_levels = self.walker.max_levels();

        if referral.cpa_processed {
            return Ok(AcquisitionOutcome::skipped(
                &referral,
                AcquisitionSkip::AlreadyProcessed,
                max_levels,
            ));
        }

        let decision = self.evaluate(&referral)?;
        if !decision.eligible {
            let reason = decision
                .reason
                .unwrap_or_else(|| "eligibility criteria not met".to_string());
            return Ok(AcquisitionOutcome::skipped(
                &referral,
                AcquisitionSkip::NotEligible { reason },
                max_levels,
            ));
        }

        let steps = self.walker.walk(self.store.as_ref(), &referral.affiliate_id)?;

        // Reads are done; the flip decides which caller gets to write.
        if !self.store.try_mark_cpa_processed(referral_id)? {
            return Ok(AcquisitionOutcome::skipped(
                &referral,
                AcquisitionSkip::AlreadyProcessed,
                max_levels,
            ));
        }
        self.store.mark_referral_validated(referral_id)?;

        let direct = &steps[0].affiliate;
        let row = self.plan.require_tier(direct.validated_referrals)?;

        let mut lines = Vec::with_capacity(steps.len());
        let mut total_cents: i64 = 0;
        let mut events_published = 0usize;
        for step in &steps {
            let amount_cents = row.cpa_amount_cents(step.level);
            if amount_cents == 0 {
                lines.push(CommissionLine {
                    level: step.level,
                    affiliate_id: step.affiliate.affiliate_id.clone(),
                    amount_cents: 0,
                    commission_id: None,
                    skipped: Some(LineSkip::ZeroAmount),
                });
                continue;
            }

            let source_affiliate_id =
                (step.level > 1).then(|| referral.affiliate_id.clone());
            let commission = self.ledger.create(NewCommission {
                affiliate_id: step.affiliate.affiliate_id.clone(),
                source_affiliate_id,
                referral_id: Some(referral.referral_id.clone()),
                kind: CommissionKind::Cpa,
                level: step.level,
                base_amount_cents: amount_cents,
                rate_bps: None,
                amount_cents,
                period: None,
                created_at_unix_ms: now_unix_ms,
            })?;
            // Acquisition bonuses accrue to lifetime totals; the available
            // balance moves when the commission is approved downstream.
            self.ledger
                .credit(&commission.affiliate_id, 0, amount_cents)?;
            total_cents = total_cents.saturating_add(amount_cents);

            if self
                .bus
                .publish(&EngineEvent::CommissionCalculated {
                    commission_id: commission.commission_id,
                    affiliate_id: commission.affiliate_id.clone(),
                    source_affiliate_id: commission.source_affiliate_id.clone(),
                    referral_id: commission.referral_id.clone(),
                    kind: CommissionKind::Cpa,
                    level: commission.level,
                    amount_cents: commission.amount_cents,
                    period: None,
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

        // The acquirer's count moves once per validated referral, and the
        // cached tier follows it.
        let validated_referrals = self
            .ledger
            .record_validated_referral(&referral.affiliate_id)?;
        let new_row = self.plan.require_tier(validated_referrals)?;
        let promoted = new_row.tier != direct.tier || new_row.tier_level != direct.tier_level;
        if promoted {
            self.ledger
                .set_tier(&referral.affiliate_id, &new_row.tier, new_row.tier_level)?;
        }

        let levels_paid = lines
            .iter()
            .filter(|line| line.commission_id.is_some())
            .count() as Level;
        let settlement_hash = lines_digest(
            "cpa",
            &referral.referral_id,
            total_cents,
            &lines,
        )?;
        if self
            .bus
            .publish(&EngineEvent::AcquisitionGranted {
                referral_id: referral.referral_id.clone(),
                affiliate_id: referral.affiliate_id.clone(),
                total_cents,
                levels_paid,
                settlement_hash: settlement_hash.clone(),
            })
            .is_ok()
        {
            events_published += 1;
        }

        Ok(AcquisitionOutcome {
            referral_id: referral.referral_id.clone(),
            affiliate_id: referral.affiliate_id.clone(),
            skipped: None,
            walked_levels: steps.len() as Level,
            max_levels,
            total_cents,
            lines,
            tier_update: Some(TierUpdate {
                validated_referrals,
                tier: new_row.tier.clone(),
                tier_level: new_row.tier_level,
                promoted,
            }),
            events_published,
            settlement_hash: Some(settlement_hash),
        })
    }

    fn evaluate(&self, referral: &Referral) -> Result<EligibilityDecision, EngineError> {
        let mut transactions = self
            .store
            .transactions_for_customer(&referral.customer_id)?;
        transactions.sort_by(|a, b| {
            a.created_at_unix_ms
                .cmp(&b.created_at_unix_ms)
                .then_with(|| a.transaction_id.cmp(&b.transaction_id))
        });
        Ok(evaluate_eligibility(&self.plan.cpa_model, &transactions))
    }
}

/// Index of the earliest completed deposit meeting the threshold.
fn first_qualifying_deposit(ordered: &[Transaction], min_deposit_cents: i64) -> Option<usize> {
    ordered.iter().position(|tx| {
        tx.kind == TransactionKind::Deposit
            && tx.status == TransactionStatus::Completed
            && tx.amount_cents >= min_deposit_cents
    })
}

/// Pure eligibility check over a customer's transactions, ascending by
/// creation time. Anything short of the model's criteria fails closed.
fn evaluate_eligibility(model: &CpaModel, ordered: &[Transaction]) -> EligibilityDecision {
    match model {
        CpaModel::DirectDeposit { min_deposit_cents } => {
            match first_qualifying_deposit(ordered, *min_deposit_cents) {
                Some(index) => EligibilityDecision::satisfied(&ordered[index]),
                None => EligibilityDecision::unsatisfied(format!(
                    "no completed deposit of at least {min_deposit_cents} cents"
                )),
            }
        }
        CpaModel::DepositPlusActivity {
            min_deposit_cents,
            min_bets,
            min_ggr_cents,
        } => {
            let Some(anchor) = first_qualifying_deposit(ordered, *min_deposit_cents) else {
                return EligibilityDecision::unsatisfied(format!(
                    "no completed deposit of at least {min_deposit_cents} cents"
                ));
            };
            // Only activity after the qualifying deposit counts.
            let mut bets: u32 = 0;
            let mut ggr_cents: i64 = 0;
            for tx in &ordered[anchor + 1..] {
                if tx.status != TransactionStatus::Completed {
                    continue;
                }
                match tx.kind {
                    TransactionKind::Bet => bets = bets.saturating_add(1),
                    TransactionKind::Ggr => {
                        ggr_cents = ggr_cents.saturating_add(tx.amount_cents)
                    }
                    _ => {}
                }
            }
            let bets_met = *min_bets > 0 && bets >= *min_bets;
            let ggr_met = *min_ggr_cents > 0 && ggr_cents >= *min_ggr_cents;
            if bets_met || ggr_met {
                EligibilityDecision::satisfied(&ordered[anchor])
            } else {
                EligibilityDecision::unsatisfied(format!(
                    "activity after deposit below thresholds: {bets} bets, {ggr_cents} ggr cents"
                ))
            }
        }
    }
}
