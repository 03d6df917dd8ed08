//! Two-sided conflicts whose score drifts towards one faction's goal.
//!
//! The snapshot only carries the current score; the score history is derived
//! here, checkpointed on large moves and on every change of side.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::wire;
use crate::engine::history::{self, HistoryPoint};
use crate::engine::patch::Patch;
use crate::engine::types::CountedItem;
use crate::reconcile::{Category, PassContext};

/// Fraction of the goal a score must move before the history is persisted.
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invasion {
    pub start: i64,
    pub location: String,
    pub attacker: String,
    pub defender: String,
    pub score: f64,
    pub goal: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker_rewards: Option<Vec<CountedItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defender_rewards: Option<Vec<CountedItem>>,
    pub completed: bool,
    #[serde(default)]
    pub score_history: Vec<HistoryPoint>,
}

#[derive(Debug)]
pub struct Invasions {
    threshold: f64,
}

impl Invasions {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for Invasions {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_THRESHOLD)
    }
}

// score and score_history are owned by `track`
const FIELDS: &[&str] = &[
    "start",
    "location",
    "attacker",
    "defender",
    "goal",
    "attacker_rewards",
    "defender_rewards",
    "completed",
];

fn faction(raw: &Value, info: &str, ctx: &PassContext) -> String {
    let key = raw
        .get(info)
        .and_then(|i| wire::str_field(i, "faction"))
        .unwrap_or_default();
    ctx.vocabulary.faction(key).to_string()
}

impl Category for Invasions {
    type Record = Invasion;

    fn name(&self) -> &str {
        "invasions"
    }

    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value> {
        wire::array(snapshot, "Invasions")
    }

    fn id(&self, raw: &Value) -> Option<String> {
        wire::oid(raw)
    }

    fn normalize(&self, raw: &Value, ctx: &mut PassContext) -> Result<Invasion> {
        let vocab = &ctx.vocabulary;
        let rewards = |key: &str| {
            wire::counted_items(raw.get(key).and_then(|r| r.get("countedItems")), |s| {
                vocab.item(s).to_string()
            })
        };

        Ok(Invasion {
            start: wire::date_field(raw, "Activation").context("invasion without Activation")?,
            location: vocab.node(wire::str_field(raw, "Node").unwrap_or_default()).to_string(),
            attacker: faction(raw, "AttackerMissionInfo", ctx),
            defender: faction(raw, "DefenderMissionInfo", ctx),
            score: wire::f64_field(raw, "Count").context("invasion without Count")?,
            goal: wire::f64_field(raw, "Goal").context("invasion without Goal")?,
            attacker_rewards: rewards("AttackerReward"),
            defender_rewards: rewards("DefenderReward"),
            completed: raw.get("Completed").and_then(Value::as_bool).unwrap_or(false),
            score_history: Vec::new(),
        })
    }

    fn is_active(&self, record: &Invasion, _now: i64) -> bool {
        !record.completed && record.score.abs() < record.goal
    }

    fn diff_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn on_create(&self, record: &mut Invasion, now: i64) {
        record.score_history = vec![HistoryPoint(now, record.score)];
    }

    fn track(&self, stored: &mut Invasion, fresh: &Invasion, now: i64) -> Option<Patch> {
        if stored.score == fresh.score {
            return None;
        }

        let threshold = self.threshold * stored.goal.abs().max(1.0);
        let points = &mut stored.score_history;

        let crossing = points
            .last()
            .and_then(|&prev| history::interpolate_zero_crossing(prev, fresh.score, now));
        let persist = match crossing {
            Some(t) => {
                if let Some(last) = points.last_mut() {
                    last.0 = last.timestamp();
                }
                points.push(HistoryPoint(t, 0.0));
                true
            }
            None => history::checkpoint(fresh.score, points, now, threshold),
        };
        history::update(fresh.score, points, now);
        stored.score = fresh.score;

        if !persist {
            return None;
        }

        let mut diff = Patch::new();
        diff.set("score", Value::from(stored.score));
        if let Err(err) = diff.set_serialized("score_history", &stored.score_history) {
            log::error!("[RECONCILE] invasions: {err:#}");
            return None;
        }
        Some(diff)
    }

    fn finalize(&self, record: &mut Invasion, now: i64) {
        history::finalize(&mut record.score_history, now);
    }
}
