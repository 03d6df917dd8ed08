use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::vocabulary::Vocabulary;
use crate::engine::types::RewardTier;

/// State shared by every category during one reconciliation pass.
#[derive(Debug, Clone)]
pub struct PassContext {
    /// Snapshot time, seconds.
    pub now: i64,
    pub vocabulary: Arc<Vocabulary>,
    /// Reward tables seen this pass, keyed by entity display name.
    pub entity_rewards: BTreeMap<String, Vec<RewardTier>>,
}

impl PassContext {
    pub fn new(now: i64, vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            now,
            vocabulary,
            entity_rewards: BTreeMap::new(),
        }
    }

    pub fn record_rewards(&mut self, entity: impl Into<String>, tiers: Vec<RewardTier>) {
        self.entity_rewards.insert(entity.into(), tiers);
    }
}
