//! Domain events published to the external event bus.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use super::error::EngineError;
use super::model::CommissionKind;
use super::period::Period;
use super::types::{CommissionId, Level};

/// Events announcing completed engine work.
///
/// Delivery is at-least-once: a failed publish never rolls back ledger
/// writes, and consumers are expected to dedupe on commission id or on
/// (affiliate, period).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum EngineEvent {
    /// One commission line was persisted.
    #[serde(rename = "commission.calculated")]
    CommissionCalculated {
        commission_id: CommissionId,
        affiliate_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source_affiliate_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        referral_id: Option<String>,
        kind: CommissionKind,
        level: Level,
        amount_cents: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        period: Option<Period>,
    },
    /// A referral's one-time acquisition bonus finished distributing.
    #[serde(rename = "cpa.granted")]
    AcquisitionGranted {
        referral_id: String,
        affiliate_id: String,
        total_cents: i64,
        levels_paid: Level,
        settlement_hash: String,
    },
    /// An affiliate's negative carryover changed while settling a period.
    #[serde(rename = "carryover.adjusted")]
    CarryoverAdjusted {
        affiliate_id: String,
        period: Period,
        ngr_cents: i64,
        carryover_before_cents: i64,
        carryover_after_cents: i64,
    },
    /// A source affiliate's period finished distributing.
    #[serde(rename = "revshare.settled")]
    RevenueShareSettled {
        affiliate_id: String,
        period: Period,
        adjusted_ngr_cents: i64,
        distributed_cents: i64,
        levels_paid: Level,
        settlement_hash: String,
    },
}

impl EngineEvent {
    /// The affiliate the event is about: the receiver for commission lines,
    /// the source for settlements and carryover changes.
    pub fn affiliate_id(&self) -> &str {
        match self {
            EngineEvent::CommissionCalculated { affiliate_id, .. } => affiliate_id,
            EngineEvent::AcquisitionGranted { affiliate_id, .. } => affiliate_id,
            EngineEvent::CarryoverAdjusted { affiliate_id, .. } => affiliate_id,
            EngineEvent::RevenueShareSettled { affiliate_id, .. } => affiliate_id,
        }
    }

    /// JSON wire form, `{"type": ..., "data": ...}`.
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Transport the engine announces events on. Implementations deliver to a
/// message broker, an outbox table, or stay in memory.
pub trait EventBus: Send + Sync {
    fn publish(&self, event: &EngineEvent) -> Result<(), EngineError>;
}

/// In-memory bus that records everything published to it.
#[derive(Debug, Default)]
pub struct MemoryBus {
    published: Mutex<Vec<EngineEvent>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<EngineEvent> {
        self.published.lock().expect("lock published").clone()
    }

    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut published = self.published.lock().expect("lock published");
        std::mem::take(&mut *published)
    }
}

impl EventBus for MemoryBus {
    fn publish(&self, event: &EngineEvent) -> Result<(), EngineError> {
        let mut published = self.published.lock().expect("lock published");
        published.push(event.clone());
        Ok(())
    }
}
