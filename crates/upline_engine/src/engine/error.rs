//! Error types for the engine module.

use std::io;

use super::plan::PlanViolation;

/// Hard failures that abort an engine operation.
///
/// Benign outcomes (already processed, not eligible, nothing to pay) are not
/// errors; they are reported in the operation's outcome so retries stay
/// side-effect free.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Referenced affiliate does not exist.
    AffiliateNotFound { affiliate_id: String },
    /// Referenced referral does not exist.
    ReferralNotFound { referral_id: String },
    /// The commission plan failed validation.
    PlanInvalid { violations: Vec<PlanViolation> },
    /// A commission line failed the ledger's consistency checks.
    CommissionInvalid { reason: String },
    /// The storage collaborator reported a failure.
    Storage { reason: String },
    /// Serialization error.
    Serde(String),
    /// IO error.
    Io(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}

impl From<serde_cbor::Error> for EngineError {
    fn from(err: serde_cbor::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Serde(err.to_string())
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}
