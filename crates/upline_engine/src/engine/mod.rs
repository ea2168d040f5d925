//! Engine module - the core commission distribution engine.
//!
//! This module contains the distribution engines and all supporting types for:
//! - Tier resolution from validated referral counts
//! - One-time acquisition (CPA) bonuses on first qualifying deposits
//! - Periodic revenue share with negative carryover and inactivity decay
//! - Bounded sponsor-hierarchy traversal
//! - Commission persistence and balance aggregation

mod acquisition;
mod error;
mod events;
mod hierarchy;
mod ledger;
mod model;
mod period;
mod plan;
mod revenue_share;
mod store;
mod types;
mod util;

#[cfg(test)]
mod tests;

// Re-export all public types

// Types
pub use types::{CommissionId, Level, UnixMillis};

// Periods
pub use period::{Period, MILLIS_PER_DAY};

// Records
pub use model::{
    Affiliate, Commission, CommissionKind, CommissionStatus, NewCommission, Referral, Transaction,
    TransactionKind, TransactionStatus,
};

// Commission plan
pub use plan::{
    CommissionPlan, CpaModel, DecayStep, PlanReport, PlanViolation, TierRow, BPS_DENOMINATOR,
    DEFAULT_CPA_MIN_DEPOSIT_CENTS, DEFAULT_MAX_LEVELS,
};

// Errors
pub use error::EngineError;

// Events
pub use events::{EngineEvent, EventBus, MemoryBus};

// Storage
pub use store::{AffiliateStore, MemoryStore};

// Hierarchy
pub use hierarchy::{HierarchyStep, HierarchyWalker, MAX_HIERARCHY_DEPTH};

// Ledger
pub use ledger::{CommissionLedger, CommissionLine, LineSkip};

// Acquisition
pub use acquisition::{
    AcquisitionEngine, AcquisitionOutcome, AcquisitionSkip, EligibilityDecision, TierUpdate,
};

// Revenue share
pub use revenue_share::{
    net_gaming_revenue, BatchFailure, BatchReport, DistributionOutcome, DistributionSkip,
    RevenueShareEngine,
};

// Utilities
pub use util::{
    read_json_from_path, settlement_hash, sha256_hex, to_canonical_cbor, write_json_to_path,
};
