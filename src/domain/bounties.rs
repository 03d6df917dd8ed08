//! Syndicate bounty boards.
//!
//! Each board lists jobs whose reward tables are only referenced by path in
//! the snapshot; they are resolved through the vocabulary. Jobs of active
//! boards are recorded into the pass-wide entity rewards cache.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::wire;
use crate::engine::diff::{diff_list, diff_reward_tables};
use crate::engine::patch::Patch;
use crate::engine::record_difference;
use crate::domain::vocabulary::Vocabulary;
use crate::engine::types::RewardTier;
use crate::reconcile::{Category, PassContext};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub kind: String,
    pub min_level: u32,
    pub max_level: u32,
    pub mastery: u32,
    #[serde(default)]
    pub standing: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Vec<RewardTier>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounty {
    pub start: i64,
    pub end: i64,
    pub syndicate: String,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Default)]
pub struct Bounties;

const FIELDS: &[&str] = &["start", "end", "syndicate"];

fn same_job(a: &Job, b: &Job) -> bool {
    a.kind == b.kind
        && a.min_level == b.min_level
        && a.max_level == b.max_level
        && a.mastery == b.mastery
        && a.standing == b.standing
        && diff_reward_tables(a.rewards.as_deref(), b.rewards.as_deref()).is_unchanged()
}

impl Bounties {
    fn job(raw: &Value, vocab: &Vocabulary) -> Job {
        let kind = vocab.item(wire::str_field(raw, "jobType").unwrap_or_default()).to_string();

        let rewards = wire::str_field(raw, "rewards").and_then(|path| {
            let table = vocab.reward_table(path);
            if table.is_none() {
                log::debug!("[RECONCILE] bounties: unknown reward table {path}");
            }
            table.map(<[RewardTier]>::to_vec)
        });

        let standing = raw
            .get("xpAmounts")
            .and_then(Value::as_array)
            .map(|a| {
                a.iter()
                    .filter_map(Value::as_u64)
                    .filter_map(|n| u32::try_from(n).ok())
                    .collect()
            })
            .unwrap_or_default();

        Job {
            kind,
            min_level: wire::u32_field(raw, "minEnemyLevel"),
            max_level: wire::u32_field(raw, "maxEnemyLevel"),
            mastery: wire::u32_field(raw, "masteryReq"),
            standing,
            rewards,
        }
    }
}

impl Category for Bounties {
    type Record = Bounty;

    fn name(&self) -> &str {
        "bounties"
    }

    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value> {
        wire::array(snapshot, "SyndicateMissions")
            .into_iter()
            .filter(|m| !wire::array(m, "Jobs").is_empty())
            .collect()
    }

    fn id(&self, raw: &Value) -> Option<String> {
        wire::oid(raw)
    }

    fn normalize(&self, raw: &Value, ctx: &mut PassContext) -> Result<Bounty> {
        let tag = wire::str_field(raw, "Tag").context("bounty without Tag")?;
        let jobs = wire::array(raw, "Jobs")
            .into_iter()
            .map(|job| Self::job(job, &ctx.vocabulary))
            .collect();

        Ok(Bounty {
            start: wire::date_field(raw, "Activation").context("bounty without Activation")?,
            end: wire::date_field(raw, "Expiry").context("bounty without Expiry")?,
            syndicate: ctx.vocabulary.syndicate(tag).to_string(),
            jobs,
        })
    }

    fn is_active(&self, record: &Bounty, now: i64) -> bool {
        record.end >= now
    }

    fn on_active(&self, record: &Bounty, ctx: &mut PassContext) {
        for job in &record.jobs {
            if let Some(tiers) = &job.rewards {
                ctx.record_rewards(job.kind.clone(), tiers.clone());
            }
        }
    }

    fn diff_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn diff(&self, stored: &Bounty, fresh: &Bounty) -> Result<Vec<Patch>> {
        let mut diff = record_difference(stored, fresh, FIELDS)?;
        diff_list(Some(stored.jobs.as_slice()), Some(fresh.jobs.as_slice()), same_job)
            .record_into(&mut diff, "jobs")?;
        Ok(vec![diff])
    }
}
