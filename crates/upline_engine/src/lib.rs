pub mod engine;

pub use engine::{
    AcquisitionEngine, AcquisitionOutcome, AcquisitionSkip, Affiliate, AffiliateStore, BatchFailure,
    BatchReport, Commission, CommissionId, CommissionKind, CommissionLedger, CommissionLine,
    CommissionPlan, CommissionStatus, CpaModel, DecayStep, DistributionOutcome, DistributionSkip,
    EligibilityDecision, EngineError, EngineEvent, EventBus, HierarchyStep, HierarchyWalker,
    Level, LineSkip, MemoryBus, MemoryStore, NewCommission, Period, PlanReport, PlanViolation,
    Referral, RevenueShareEngine, TierRow, TierUpdate, Transaction, TransactionKind,
    TransactionStatus, UnixMillis, MAX_HIERARCHY_DEPTH,
};

pub use engine::{
    net_gaming_revenue, read_json_from_path, settlement_hash, sha256_hex, to_canonical_cbor,
    write_json_to_path,
};
