//! Core records of the affiliate network.
//!
//! All monetary amounts are integer cents. Rates are basis points (1/100 of a
//! percent). Timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};

use super::period::{Period, MILLIS_PER_DAY};
use super::types::{CommissionId, Level, UnixMillis};

/// A member of the affiliate network.
///
/// `sponsor_id` points at the affiliate one level up; the chain of sponsors
/// forms the hierarchy that commissions travel along. `tier` and `tier_level`
/// are a cache of the plan row matching `validated_referrals` and are refreshed
/// whenever the count changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affiliate {
    pub affiliate_id: String,
    #[serde(default)]
    pub sponsor_id: Option<String>,
    #[serde(default)]
    pub validated_referrals: u32,
    pub tier: String,
    pub tier_level: u8,
    /// Accumulated losses owed back before revenue share pays out again.
    /// Always >= 0.
    #[serde(default)]
    pub negative_carryover_cents: i64,
    #[serde(default)]
    pub last_activity_at_unix_ms: Option<UnixMillis>,
    #[serde(default)]
    pub available_balance_cents: i64,
    #[serde(default)]
    pub lifetime_commissions_cents: i64,
}

impl Affiliate {
    /// Whole days since the affiliate's recorded activity. `None` when no
    /// activity was ever recorded.
    pub fn days_inactive(&self, now_unix_ms: UnixMillis) -> Option<i64> {
        let last = self.last_activity_at_unix_ms?;
        if now_unix_ms <= last {
            return Some(0);
        }
        Some((now_unix_ms - last) / MILLIS_PER_DAY)
    }
}

/// Link between a referred customer and the affiliate who acquired them.
///
/// The counters mirror the customer's transaction history; eligibility checks
/// read the transactions themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Referral {
    pub referral_id: String,
    pub affiliate_id: String,
    pub customer_id: String,
    /// Set once, when the acquisition criteria are first satisfied.
    #[serde(default)]
    pub is_validated: bool,
    /// Guard against paying the one-time acquisition bonus twice.
    #[serde(default)]
    pub cpa_processed: bool,
    #[serde(default)]
    pub first_deposit_cents: i64,
    #[serde(default)]
    pub total_bets: u32,
    #[serde(default)]
    pub total_ggr_cents: i64,
    pub created_at_unix_ms: UnixMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    Bonus,
    Bet,
    Ggr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Cancelled,
}

/// A customer money or gaming event. Source of truth for both acquisition
/// eligibility and period revenue computation. Only `Completed` transactions
/// count toward revenue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub customer_id: String,
    pub kind: TransactionKind,
    pub amount_cents: i64,
    pub status: TransactionStatus,
    pub created_at_unix_ms: UnixMillis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    Cpa,
    Revshare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Calculated,
    Approved,
    Paid,
    Cancelled,
}

/// A single credit owed to one affiliate at one hierarchy level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub commission_id: CommissionId,
    /// The affiliate receiving the credit.
    pub affiliate_id: String,
    /// The downline affiliate whose activity produced it, when it differs
    /// from the receiver.
    #[serde(default)]
    pub source_affiliate_id: Option<String>,
    #[serde(default)]
    pub referral_id: Option<String>,
    pub kind: CommissionKind,
    pub level: Level,
    /// The amount the rate was applied to: the adjusted NGR for revenue
    /// share, the table amount for acquisition bonuses.
    pub base_amount_cents: i64,
    #[serde(default)]
    pub rate_bps: Option<u32>,
    pub amount_cents: i64,
    pub status: CommissionStatus,
    #[serde(default)]
    pub period: Option<Period>,
    pub created_at_unix_ms: UnixMillis,
}

/// A commission line before the store assigns an id. Every new commission
/// starts in `Calculated` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCommission {
    pub affiliate_id: String,
    #[serde(default)]
    pub source_affiliate_id: Option<String>,
    #[serde(default)]
    pub referral_id: Option<String>,
    pub kind: CommissionKind,
    pub level: Level,
    pub base_amount_cents: i64,
    #[serde(default)]
    pub rate_bps: Option<u32>,
    pub amount_cents: i64,
    #[serde(default)]
    pub period: Option<Period>,
    pub created_at_unix_ms: UnixMillis,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affiliate() -> Affiliate {
        Affiliate {
            affiliate_id: "aff-1".to_string(),
            sponsor_id: None,
            validated_referrals: 0,
            tier: "bronze".to_string(),
            tier_level: 1,
            negative_carryover_cents: 0,
            last_activity_at_unix_ms: None,
            available_balance_cents: 0,
            lifetime_commissions_cents: 0,
        }
    }

    #[test]
    fn days_inactive_counts_whole_days() {
        let mut subject = affiliate();
        assert_eq!(subject.days_inactive(1_000_000), None);

        subject.last_activity_at_unix_ms = Some(0);
        assert_eq!(subject.days_inactive(MILLIS_PER_DAY - 1), Some(0));
        assert_eq!(subject.days_inactive(MILLIS_PER_DAY), Some(1));
        assert_eq!(subject.days_inactive(95 * MILLIS_PER_DAY + 1), Some(95));
    }

    #[test]
    fn days_inactive_never_negative() {
        let mut subject = affiliate();
        subject.last_activity_at_unix_ms = Some(10 * MILLIS_PER_DAY);
        assert_eq!(subject.days_inactive(3 * MILLIS_PER_DAY), Some(0));
    }

    #[test]
    fn transaction_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TransactionKind::Withdrawal).expect("serialize");
        assert_eq!(json, "\"withdrawal\"");
        let kind: TransactionKind = serde_json::from_str("\"ggr\"").expect("deserialize");
        assert_eq!(kind, TransactionKind::Ggr);
    }

    #[test]
    fn affiliate_defaults_fill_missing_fields() {
        let parsed: Affiliate = serde_json::from_str(
            r#"{"affiliate_id":"aff-9","tier":"bronze","tier_level":1}"#,
        )
        .expect("deserialize");
        assert_eq!(parsed.sponsor_id, None);
        assert_eq!(parsed.validated_referrals, 0);
        assert_eq!(parsed.negative_carryover_cents, 0);
        assert_eq!(parsed.available_balance_cents, 0);
    }
}
