//! Bounded sponsor-chain traversal.

use super::error::EngineError;
use super::model::Affiliate;
use super::store::AffiliateStore;
use super::types::Level;

/// Hard ceiling on how far a commission travels up the sponsor chain.
pub const MAX_HIERARCHY_DEPTH: Level = 5;

/// One affiliate visited by a walk. Level 1 is the start affiliate itself.
#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyStep {
    pub level: Level,
    pub affiliate: Affiliate,
}

/// Walks the sponsor chain upward from a start affiliate, visiting at most
/// `max_levels` affiliates.
///
/// Reaching the top of the chain or a dangling sponsor reference ends the
/// walk early; neither is an error. Only a missing start affiliate is.
/// Sponsor cycles are forbidden when affiliates are created, so the walk
/// does not look for them; the level bound keeps it finite either way.
#[derive(Debug, Clone, Copy)]
pub struct HierarchyWalker {
    max_levels: Level,
}

impl HierarchyWalker {
    pub fn new(max_levels: Level) -> Self {
        Self {
            max_levels: max_levels.clamp(1, MAX_HIERARCHY_DEPTH),
        }
    }

    pub fn max_levels(&self) -> Level {
        self.max_levels
    }

    pub fn walk(
        &self,
        store: &dyn AffiliateStore,
        start_affiliate_id: &str,
    ) -> Result<Vec<HierarchyStep>, EngineError> {
        let Some(mut current) = store.affiliate(start_affiliate_id)? else {
            return Err(EngineError::AffiliateNotFound {
                affiliate_id: start_affiliate_id.to_string(),
            });
        };

        let mut steps = Vec::with_capacity(usize::from(self.max_levels));
        let mut level: Level = 1;
        loop {
            let sponsor_id = current.sponsor_id.clone();
            steps.push(HierarchyStep {
                level,
                affiliate: current,
            });
            if level >= self.max_levels {
                break;
            }
            let Some(sponsor_id) = sponsor_id else {
                break;
            };
            match store.affiliate(&sponsor_id)? {
                Some(sponsor) => {
                    current = sponsor;
                    level += 1;
                }
                None => break,
            }
        }
        Ok(steps)
    }
}
