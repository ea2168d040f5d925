//! Storage collaborator contract and the in-memory reference store.
//!
//! The engines never own persistence. They speak to an [`AffiliateStore`]
//! whose mutations are atomic per call; the check-and-set guards are what
//! make retries and concurrent calls safe. [`MemoryStore`] is the reference
//! implementation used in tests and embedded setups.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::error::EngineError;
use super::model::{
    Affiliate, Commission, CommissionStatus, NewCommission, Referral, Transaction,
};
use super::period::Period;
use super::types::{CommissionId, UnixMillis};

/// Persistence boundary for the engines.
///
/// Every method is one atomic operation. The `try_*` guards return whether
/// this call won the flip, so exactly one concurrent caller proceeds.
pub trait AffiliateStore: Send + Sync {
    fn affiliate(&self, affiliate_id: &str) -> Result<Option<Affiliate>, EngineError>;

    fn referral(&self, referral_id: &str) -> Result<Option<Referral>, EngineError>;

    /// All transactions of one customer, no ordering guarantee.
    fn transactions_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Transaction>, EngineError>;

    /// Transactions of every customer referred by the affiliate, created
    /// within `[from_unix_ms, to_unix_ms)`.
    fn transactions_for_referrer_in_range(
        &self,
        affiliate_id: &str,
        from_unix_ms: UnixMillis,
        to_unix_ms: UnixMillis,
    ) -> Result<Vec<Transaction>, EngineError>;

    /// Flip the referral's `cpa_processed` flag. Returns true only for the
    /// call that performed the flip.
    fn try_mark_cpa_processed(&self, referral_id: &str) -> Result<bool, EngineError>;

    /// Set the referral's `is_validated` flag. Idempotent.
    fn mark_referral_validated(&self, referral_id: &str) -> Result<(), EngineError>;

    /// Claim `(affiliate_id, period)` for revenue share. Returns true only
    /// for the call that claimed it.
    fn try_claim_revshare_period(
        &self,
        affiliate_id: &str,
        period: Period,
    ) -> Result<bool, EngineError>;

    /// Persist a commission line, assigning its id. New lines start in
    /// `Calculated` status.
    fn insert_commission(&self, commission: NewCommission) -> Result<Commission, EngineError>;

    /// Atomically add to the affiliate's balance aggregates.
    fn credit_balances(
        &self,
        affiliate_id: &str,
        available_delta_cents: i64,
        lifetime_delta_cents: i64,
    ) -> Result<(), EngineError>;

    /// Atomically add `delta_cents` to the affiliate's negative carryover,
    /// clamping at zero. Returns the new carryover.
    fn adjust_carryover(&self, affiliate_id: &str, delta_cents: i64)
        -> Result<i64, EngineError>;

    /// Atomically bump the affiliate's validated referral count. Returns the
    /// new count.
    fn increment_validated_referrals(&self, affiliate_id: &str) -> Result<u32, EngineError>;

    /// Refresh the affiliate's cached tier fields.
    fn set_tier(&self, affiliate_id: &str, tier: &str, tier_level: u8)
        -> Result<(), EngineError>;
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    affiliates: BTreeMap<String, Affiliate>,
    referrals: BTreeMap<String, Referral>,
    transactions: Vec<Transaction>,
    commissions: BTreeMap<CommissionId, Commission>,
    claimed_periods: BTreeSet<(String, Period)>,
    next_commission_id: CommissionId,
}

/// In-memory store. One lock guards all collections, so every trait method
/// is atomic exactly as the contract requires.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_affiliate(&self, affiliate: Affiliate) {
        let mut inner = self.inner.lock().expect("lock store");
        inner
            .affiliates
            .insert(affiliate.affiliate_id.clone(), affiliate);
    }

    pub fn seed_referral(&self, referral: Referral) {
        let mut inner = self.inner.lock().expect("lock store");
        inner.referrals.insert(referral.referral_id.clone(), referral);
    }

    pub fn seed_transaction(&self, transaction: Transaction) {
        let mut inner = self.inner.lock().expect("lock store");
        inner.transactions.push(transaction);
    }

    pub fn commissions(&self) -> Vec<Commission> {
        let inner = self.inner.lock().expect("lock store");
        inner.commissions.values().cloned().collect()
    }

    pub fn commissions_for(&self, affiliate_id: &str) -> Vec<Commission> {
        let inner = self.inner.lock().expect("lock store");
        inner
            .commissions
            .values()
            .filter(|commission| commission.affiliate_id == affiliate_id)
            .cloned()
            .collect()
    }
}

fn affiliate_mut<'a>(
    inner: &'a mut MemoryStoreInner,
    affiliate_id: &str,
) -> Result<&'a mut Affiliate, EngineError> {
    inner
        .affiliates
        .get_mut(affiliate_id)
        .ok_or_else(|| EngineError::AffiliateNotFound {
            affiliate_id: affiliate_id.to_string(),
        })
}

impl AffiliateStore for MemoryStore {
    fn affiliate(&self, affiliate_id: &str) -> Result<Option<Affiliate>, EngineError> {
        let inner = self.inner.lock().expect("lock store");
        Ok(inner.affiliates.get(affiliate_id).cloned())
    }

    fn referral(&self, referral_id: &str) -> Result<Option<Referral>, EngineError> {
        let inner = self.inner.lock().expect("lock store");
        Ok(inner.referrals.get(referral_id).cloned())
    }

    fn transactions_for_customer(
        &self,
        customer_id: &str,
    ) -> Result<Vec<Transaction>, EngineError> {
        let inner = self.inner.lock().expect("lock store");
        Ok(inner
            .transactions
            .iter()
            .filter(|tx| tx.customer_id == customer_id)
            .cloned()
            .collect())
    }

    fn transactions_for_referrer_in_range(
        &self,
        affiliate_id: &str,
        from_unix_ms: UnixMillis,
        to_unix_ms: UnixMillis,
    ) -> Result<Vec<Transaction>, EngineError> {
        let inner = self.inner.lock().expect("lock store");
        let customers: BTreeSet<&str> = inner
            .referrals
            .values()
            .filter(|referral| referral.affiliate_id == affiliate_id)
            .map(|referral| referral.customer_id.as_str())
            .collect();
        Ok(inner
            .transactions
            .iter()
            .filter(|tx| {
                customers.contains(tx.customer_id.as_str())
                    && tx.created_at_unix_ms >= from_unix_ms
                    && tx.created_at_unix_ms < to_unix_ms
            })
            .cloned()
            .collect())
    }

    fn try_mark_cpa_processed(&self, referral_id: &str) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let referral = inner.referrals.get_mut(referral_id).ok_or_else(|| {
            EngineError::ReferralNotFound {
                referral_id: referral_id.to_string(),
            }
        })?;
        if referral.cpa_processed {
            return Ok(false);
        }
        referral.cpa_processed = true;
        Ok(true)
    }

    fn mark_referral_validated(&self, referral_id: &str) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let referral = inner.referrals.get_mut(referral_id).ok_or_else(|| {
            EngineError::ReferralNotFound {
                referral_id: referral_id.to_string(),
            }
        })?;
        referral.is_validated = true;
        Ok(())
    }

    fn try_claim_revshare_period(
        &self,
        affiliate_id: &str,
        period: Period,
    ) -> Result<bool, EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        if !inner.affiliates.contains_key(affiliate_id) {
            return Err(EngineError::AffiliateNotFound {
                affiliate_id: affiliate_id.to_string(),
            });
        }
        Ok(inner
            .claimed_periods
            .insert((affiliate_id.to_string(), period)))
    }

    fn insert_commission(&self, commission: NewCommission) -> Result<Commission, EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        inner.next_commission_id += 1;
        let commission_id = inner.next_commission_id;
        let record = Commission {
            commission_id,
            affiliate_id: commission.affiliate_id,
            source_affiliate_id: commission.source_affiliate_id,
            referral_id: commission.referral_id,
            kind: commission.kind,
            level: commission.level,
            base_amount_cents: commission.base_amount_cents,
            rate_bps: commission.rate_bps,
            amount_cents: commission.amount_cents,
            status: CommissionStatus::Calculated,
            period: commission.period,
            created_at_unix_ms: commission.created_at_unix_ms,
        };
        inner.commissions.insert(commission_id, record.clone());
        Ok(record)
    }

    fn credit_balances(
        &self,
        affiliate_id: &str,
        available_delta_cents: i64,
        lifetime_delta_cents: i64,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let affiliate = affiliate_mut(&mut inner, affiliate_id)?;
        affiliate.available_balance_cents = affiliate
            .available_balance_cents
            .saturating_add(available_delta_cents);
        affiliate.lifetime_commissions_cents = affiliate
            .lifetime_commissions_cents
            .saturating_add(lifetime_delta_cents);
        Ok(())
    }

    fn adjust_carryover(
        &self,
        affiliate_id: &str,
        delta_cents: i64,
    ) -> Result<i64, EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let affiliate = affiliate_mut(&mut inner, affiliate_id)?;
        affiliate.negative_carryover_cents = affiliate
            .negative_carryover_cents
            .saturating_add(delta_cents)
            .max(0);
        Ok(affiliate.negative_carryover_cents)
    }

    fn increment_validated_referrals(&self, affiliate_id: &str) -> Result<u32, EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let affiliate = affiliate_mut(&mut inner, affiliate_id)?;
        affiliate.validated_referrals = affiliate.validated_referrals.saturating_add(1);
        Ok(affiliate.validated_referrals)
    }

    fn set_tier(
        &self,
        affiliate_id: &str,
        tier: &str,
        tier_level: u8,
    ) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().expect("lock store");
        let affiliate = affiliate_mut(&mut inner, affiliate_id)?;
        affiliate.tier = tier.to_string();
        affiliate.tier_level = tier_level;
        Ok(())
    }
}
