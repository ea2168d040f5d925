//! Commission plan: tier table, acquisition eligibility model, and the
//! inactivity decay schedule.
//!
//! Plans are loaded from TOML at startup and validated before any engine is
//! constructed. Engines treat a plan as immutable for their lifetime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::EngineError;
use super::hierarchy::MAX_HIERARCHY_DEPTH;
use super::types::Level;

pub const BPS_DENOMINATOR: i64 = 10_000;

pub const DEFAULT_MAX_LEVELS: Level = 5;
pub const DEFAULT_CPA_MIN_DEPOSIT_CENTS: i64 = 5_000;

/// How a referral qualifies for the one-time acquisition bonus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum CpaModel {
    /// A single completed deposit at or above the threshold qualifies.
    DirectDeposit { min_deposit_cents: i64 },
    /// A lower deposit threshold combined with betting activity observed
    /// after that deposit: at least `min_bets` completed bets, or completed
    /// gaming revenue totalling `min_ggr_cents`.
    DepositPlusActivity {
        min_deposit_cents: i64,
        min_bets: u32,
        min_ggr_cents: i64,
    },
}

/// One row of the tier table. Rows partition the validated-referral counts:
/// `min_referrals..=max_referrals`, with `max_referrals = None` leaving the
/// last row open-ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierRow {
    pub tier: String,
    pub tier_level: u8,
    pub min_referrals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_referrals: Option<u32>,
    /// Acquisition bonus per hierarchy level, index 0 = level 1. Levels past
    /// the end of the schedule pay nothing.
    pub cpa_amounts_cents: Vec<i64>,
    pub revshare_level1_bps: u32,
    pub revshare_upper_bps: u32,
}

impl TierRow {
    pub fn contains(&self, validated_referrals: u32) -> bool {
        if validated_referrals < self.min_referrals {
            return false;
        }
        match self.max_referrals {
            Some(max) => validated_referrals <= max,
            None => true,
        }
    }

    pub fn cpa_amount_cents(&self, level: Level) -> i64 {
        if level == 0 {
            return 0;
        }
        self.cpa_amounts_cents
            .get(usize::from(level) - 1)
            .copied()
            .unwrap_or(0)
    }

    pub fn revshare_rate_bps(&self, level: Level) -> u32 {
        if level <= 1 {
            self.revshare_level1_bps
        } else {
            self.revshare_upper_bps
        }
    }
}

/// A step of the inactivity decay schedule: commissions for an affiliate
/// inactive for at least `min_days_inactive` days are reduced by
/// `reduction_bps`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecayStep {
    pub min_days_inactive: u32,
    pub reduction_bps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionPlan {
    /// Hierarchy depth commissions travel, capped at `MAX_HIERARCHY_DEPTH`.
    pub max_levels: Level,
    pub cpa_model: CpaModel,
    pub tiers: Vec<TierRow>,
    /// Ascending by `min_days_inactive`; the deepest matching step applies.
    pub decay_steps: Vec<DecayStep>,
}

impl Default for CommissionPlan {
    fn default() -> Self {
        Self {
            max_levels: DEFAULT_MAX_LEVELS,
            cpa_model: CpaModel::DirectDeposit {
                min_deposit_cents: DEFAULT_CPA_MIN_DEPOSIT_CENTS,
            },
            tiers: default_tiers(),
            decay_steps: default_decay_steps(),
        }
    }
}

fn default_tiers() -> Vec<TierRow> {
    vec![
        TierRow {
            tier: "bronze".to_string(),
            tier_level: 1,
            min_referrals: 0,
            max_referrals: Some(10),
            cpa_amounts_cents: vec![3_000, 500, 200, 100, 50],
            revshare_level1_bps: 2_500,
            revshare_upper_bps: 200,
        },
        TierRow {
            tier: "silver".to_string(),
            tier_level: 2,
            min_referrals: 11,
            max_referrals: Some(30),
            cpa_amounts_cents: vec![3_500, 600, 250, 125, 60],
            revshare_level1_bps: 3_000,
            revshare_upper_bps: 250,
        },
        TierRow {
            tier: "gold".to_string(),
            tier_level: 3,
            min_referrals: 31,
            max_referrals: Some(75),
            cpa_amounts_cents: vec![4_500, 750, 300, 150, 75],
            revshare_level1_bps: 3_500,
            revshare_upper_bps: 300,
        },
        TierRow {
            tier: "platinum".to_string(),
            tier_level: 4,
            min_referrals: 76,
            max_referrals: Some(150),
            cpa_amounts_cents: vec![5_000, 900, 400, 200, 100],
            revshare_level1_bps: 4_000,
            revshare_upper_bps: 350,
        },
        TierRow {
            tier: "diamond".to_string(),
            tier_level: 5,
            min_referrals: 151,
            max_referrals: None,
            cpa_amounts_cents: vec![6_000, 1_000, 500, 250, 125],
            revshare_level1_bps: 4_500,
            revshare_upper_bps: 400,
        },
    ]
}

fn default_decay_steps() -> Vec<DecayStep> {
    vec![
        DecayStep {
            min_days_inactive: 30,
            reduction_bps: 1_000,
        },
        DecayStep {
            min_days_inactive: 60,
            reduction_bps: 2_500,
        },
        DecayStep {
            min_days_inactive: 90,
            reduction_bps: 5_000,
        },
    ]
}

impl CommissionPlan {
    /// Parse and validate a plan from TOML. Invalid plans are rejected here
    /// so engines never observe one.
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        let plan: Self = toml::from_str(raw)?;
        let report = plan.validate();
        if !report.is_ok() {
            return Err(EngineError::PlanInvalid {
                violations: report.violations,
            });
        }
        Ok(plan)
    }

    pub fn to_toml_string(&self) -> Result<String, EngineError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Row whose referral range contains the count. A count no row covers
    /// resolves to the lowest row; `None` only for an empty table.
    pub fn tier_for(&self, validated_referrals: u32) -> Option<&TierRow> {
        self.tiers
            .iter()
            .find(|row| row.contains(validated_referrals))
            .or_else(|| self.tiers.first())
    }

    pub fn require_tier(&self, validated_referrals: u32) -> Result<&TierRow, EngineError> {
        self.tier_for(validated_referrals)
            .ok_or_else(|| EngineError::PlanInvalid {
                violations: vec![PlanViolation::new(
                    "plan.tiers.empty",
                    "commission plan has no tier rows",
                )],
            })
    }

    /// Reduction applied to a receiver's commission for inactivity. An
    /// affiliate with no recorded activity decays at the deepest step.
    pub fn decay_reduction_bps(&self, days_inactive: Option<i64>) -> u32 {
        let Some(days) = days_inactive else {
            return self
                .decay_steps
                .iter()
                .map(|step| step.reduction_bps)
                .max()
                .unwrap_or(0);
        };
        let mut reduction = 0;
        for step in &self.decay_steps {
            if days >= i64::from(step.min_days_inactive) {
                reduction = step.reduction_bps;
            }
        }
        reduction
    }

    pub fn validate(&self) -> PlanReport {
        let mut violations = Vec::new();

        if self.max_levels == 0 || self.max_levels > MAX_HIERARCHY_DEPTH {
            violations.push(PlanViolation::new(
                "plan.max_levels",
                format!(
                    "max_levels must be within 1..={MAX_HIERARCHY_DEPTH}, got {}",
                    self.max_levels
                ),
            ));
        }

        self.validate_cpa_model(&mut violations);
        self.validate_tiers(&mut violations);
        self.validate_decay(&mut violations);

        PlanReport { violations }
    }

    fn validate_cpa_model(&self, violations: &mut Vec<PlanViolation>) {
        match &self.cpa_model {
            CpaModel::DirectDeposit { min_deposit_cents } => {
                if *min_deposit_cents <= 0 {
                    violations.push(PlanViolation::new(
                        "plan.cpa.threshold",
                        "direct deposit threshold must be positive",
                    ));
                }
            }
            CpaModel::DepositPlusActivity {
                min_deposit_cents,
                min_bets,
                min_ggr_cents,
            } => {
                if *min_deposit_cents <= 0 {
                    violations.push(PlanViolation::new(
                        "plan.cpa.threshold",
                        "deposit-plus-activity deposit threshold must be positive",
                    ));
                }
                if *min_bets == 0 && *min_ggr_cents <= 0 {
                    violations.push(PlanViolation::new(
                        "plan.cpa.activity",
                        "deposit-plus-activity requires a bet count or a revenue threshold",
                    ));
                }
            }
        }
    }

    fn validate_tiers(&self, violations: &mut Vec<PlanViolation>) {
        if self.tiers.is_empty() {
            violations.push(PlanViolation::new(
                "plan.tiers.empty",
                "commission plan has no tier rows",
            ));
            return;
        }

        if self.tiers[0].min_referrals != 0 {
            violations.push(PlanViolation::new(
                "plan.tiers.start",
                "lowest tier must start at zero referrals",
            ));
        }

        let mut names = BTreeSet::new();
        for (index, row) in self.tiers.iter().enumerate() {
            if !names.insert(row.tier.clone()) {
                violations.push(PlanViolation::new(
                    "plan.tiers.duplicate_name",
                    format!("tier name repeated: {}", row.tier),
                ));
            }
            if let Some(max) = row.max_referrals {
                if max < row.min_referrals {
                    violations.push(PlanViolation::new(
                        "plan.tiers.range",
                        format!("tier {} has an empty referral range", row.tier),
                    ));
                }
            } else if index + 1 != self.tiers.len() {
                violations.push(PlanViolation::new(
                    "plan.tiers.unbounded_middle",
                    format!("tier {} is open-ended but not last", row.tier),
                ));
            }
            if row.revshare_level1_bps > BPS_DENOMINATOR as u32
                || row.revshare_upper_bps > BPS_DENOMINATOR as u32
            {
                violations.push(PlanViolation::new(
                    "plan.tiers.rate_bounds",
                    format!("tier {} revenue share rate exceeds 100%", row.tier),
                ));
            }
            if row.cpa_amounts_cents.iter().any(|amount| *amount < 0) {
                violations.push(PlanViolation::new(
                    "plan.tiers.cpa_negative",
                    format!("tier {} has a negative acquisition amount", row.tier),
                ));
            }
        }

        for pair in self.tiers.windows(2) {
            let (lower, upper) = (&pair[0], &pair[1]);
            if upper.tier_level <= lower.tier_level {
                violations.push(PlanViolation::new(
                    "plan.tiers.level_order",
                    format!("tier {} does not increase tier_level", upper.tier),
                ));
            }
            if let Some(max) = lower.max_referrals {
                if upper.min_referrals != max.saturating_add(1) {
                    violations.push(PlanViolation::new(
                        "plan.tiers.contiguous",
                        format!(
                            "tier {} must start at {} to continue tier {}",
                            upper.tier,
                            max.saturating_add(1),
                            lower.tier
                        ),
                    ));
                }
            }
        }

        if self
            .tiers
            .last()
            .is_some_and(|row| row.max_referrals.is_some())
        {
            violations.push(PlanViolation::new(
                "plan.tiers.open_end",
                "highest tier must be open-ended",
            ));
        }
    }

    fn validate_decay(&self, violations: &mut Vec<PlanViolation>) {
        for step in &self.decay_steps {
            if step.reduction_bps > BPS_DENOMINATOR as u32 {
                violations.push(PlanViolation::new(
                    "plan.decay.bounds",
                    format!(
                        "decay at {} days exceeds 100%",
                        step.min_days_inactive
                    ),
                ));
            }
        }
        for pair in self.decay_steps.windows(2) {
            if pair[1].min_days_inactive <= pair[0].min_days_inactive {
                violations.push(PlanViolation::new(
                    "plan.decay.order",
                    "decay steps must be strictly ascending by days inactive",
                ));
            }
            if pair[1].reduction_bps < pair[0].reduction_bps {
                violations.push(PlanViolation::new(
                    "plan.decay.monotonic",
                    "decay reductions must not shrink as inactivity grows",
                ));
            }
        }
    }
}

/// A single plan validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanViolation {
    pub code: String,
    pub message: String,
}

impl PlanViolation {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of validating a plan. Empty violations means the plan is usable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanReport {
    pub violations: Vec<PlanViolation>,
}

impl PlanReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.violations.iter().any(|violation| violation.code == code)
    }
}
