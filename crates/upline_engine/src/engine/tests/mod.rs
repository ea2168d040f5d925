//! Tests for the engine module.

use super::*;

/// 2026-08-06, inside the August 2026 period.
pub(super) const IN_AUGUST: UnixMillis = 1_786_000_000_000;
/// 2026-09-01, shortly after the August 2026 period closed.
pub(super) const SETTLE_AT: UnixMillis = 1_788_300_000_000;

pub(super) fn august() -> Period {
    Period::new(2026, 8).expect("period")
}

pub(super) fn affiliate(affiliate_id: &str, sponsor_id: Option<&str>) -> Affiliate {
    Affiliate {
        affiliate_id: affiliate_id.to_string(),
        sponsor_id: sponsor_id.map(str::to_string),
        validated_referrals: 0,
        tier: "bronze".to_string(),
        tier_level: 1,
        negative_carryover_cents: 0,
        last_activity_at_unix_ms: Some(SETTLE_AT),
        available_balance_cents: 0,
        lifetime_commissions_cents: 0,
    }
}

/// Seed a sponsor chain: each id sponsors the one before it.
pub(super) fn chain(store: &MemoryStore, ids: &[&str]) {
    for (index, id) in ids.iter().enumerate() {
        store.seed_affiliate(affiliate(id, ids.get(index + 1).copied()));
    }
}

pub(super) fn referral(referral_id: &str, affiliate_id: &str, customer_id: &str) -> Referral {
    Referral {
        referral_id: referral_id.to_string(),
        affiliate_id: affiliate_id.to_string(),
        customer_id: customer_id.to_string(),
        is_validated: false,
        cpa_processed: false,
        first_deposit_cents: 0,
        total_bets: 0,
        total_ggr_cents: 0,
        created_at_unix_ms: IN_AUGUST,
    }
}

pub(super) fn transaction(
    transaction_id: &str,
    customer_id: &str,
    kind: TransactionKind,
    amount_cents: i64,
    status: TransactionStatus,
    at_unix_ms: UnixMillis,
) -> Transaction {
    Transaction {
        transaction_id: transaction_id.to_string(),
        customer_id: customer_id.to_string(),
        kind,
        amount_cents,
        status,
        created_at_unix_ms: at_unix_ms,
    }
}

pub(super) fn deposit(
    transaction_id: &str,
    customer_id: &str,
    amount_cents: i64,
    at_unix_ms: UnixMillis,
) -> Transaction {
    transaction(
        transaction_id,
        customer_id,
        TransactionKind::Deposit,
        amount_cents,
        TransactionStatus::Completed,
        at_unix_ms,
    )
}

/// Bus whose publishes always fail; distributions must shrug this off.
pub(super) struct FailingBus;

impl EventBus for FailingBus {
    fn publish(&self, _event: &EngineEvent) -> Result<(), EngineError> {
        Err(EngineError::Storage {
            reason: "bus down".to_string(),
        })
    }
}

mod acquisition;
mod concurrency;
