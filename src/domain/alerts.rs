//! Timed missions with fixed rewards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::wire;
use crate::engine::diff::{diff_counted_items, diff_items};
use crate::engine::patch::Patch;
use crate::engine::record_difference;
use crate::engine::types::CountedItem;
use crate::reconcile::{Category, PassContext};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertRewards {
    pub credits: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counted_items: Option<Vec<CountedItem>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub start: i64,
    pub end: i64,
    pub location: String,
    pub mission_type: String,
    pub faction: String,
    pub min_level: u32,
    pub max_level: u32,
    pub rewards: AlertRewards,
}

#[derive(Debug, Default)]
pub struct Alerts;

const FIELDS: &[&str] = &[
    "start",
    "end",
    "location",
    "mission_type",
    "faction",
    "min_level",
    "max_level",
];

impl Category for Alerts {
    type Record = Alert;

    fn name(&self) -> &str {
        "alerts"
    }

    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value> {
        wire::array(snapshot, "Alerts")
    }

    fn id(&self, raw: &Value) -> Option<String> {
        wire::oid(raw)
    }

    fn normalize(&self, raw: &Value, ctx: &mut PassContext) -> Result<Alert> {
        let vocab = &ctx.vocabulary;
        let info = raw.get("MissionInfo").context("alert without MissionInfo")?;
        let reward = info.get("missionReward");

        let items = reward
            .and_then(|r| r.get("items"))
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(|s| vocab.item(s).to_string())
                    .collect()
            });

        Ok(Alert {
            start: wire::date_field(raw, "Activation").context("alert without Activation")?,
            end: wire::date_field(raw, "Expiry").context("alert without Expiry")?,
            location: vocab.node(wire::str_field(info, "location").unwrap_or_default()).to_string(),
            mission_type: vocab
                .mission_type(wire::str_field(info, "missionType").unwrap_or_default())
                .to_string(),
            faction: vocab.faction(wire::str_field(info, "faction").unwrap_or_default()).to_string(),
            min_level: wire::u32_field(info, "minEnemyLevel"),
            max_level: wire::u32_field(info, "maxEnemyLevel"),
            rewards: AlertRewards {
                credits: reward.map(|r| wire::u32_field(r, "credits")).unwrap_or(0),
                items,
                counted_items: wire::counted_items(reward.and_then(|r| r.get("countedItems")), |s| {
                    vocab.item(s).to_string()
                }),
            },
        })
    }

    fn is_active(&self, record: &Alert, now: i64) -> bool {
        record.end >= now
    }

    fn diff_fields(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn diff(&self, stored: &Alert, fresh: &Alert) -> Result<Vec<Patch>> {
        let top = record_difference(stored, fresh, FIELDS)?;

        let mut rewards = Patch::within("rewards");
        if stored.rewards.credits != fresh.rewards.credits {
            rewards.set_serialized("credits", &fresh.rewards.credits)?;
        }
        diff_items(stored.rewards.items.as_deref(), fresh.rewards.items.as_deref())
            .record_into(&mut rewards, "items")?;
        diff_counted_items(
            stored.rewards.counted_items.as_deref(),
            fresh.rewards.counted_items.as_deref(),
        )
        .record_into(&mut rewards, "counted_items")?;

        Ok(vec![top, rewards])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocabulary::Vocabulary;
    use serde_json::json;
    use std::sync::Arc;

    fn raw(end_ms: i64, items: Option<Value>) -> Value {
        let mut reward = json!({"credits": 5000, "countedItems": [{"ItemType": "/Cell", "ItemCount": 2}]});
        if let Some(items) = items {
            reward["items"] = items;
        }
        json!({
            "_id": {"$oid": "a1"},
            "Activation": {"$date": {"$numberLong": "1000000"}},
            "Expiry": {"$date": {"$numberLong": end_ms.to_string()}},
            "MissionInfo": {
                "location": "SolNode1",
                "missionType": "MT_SABOTAGE",
                "faction": "FC_GRINEER",
                "minEnemyLevel": 10,
                "maxEnemyLevel": 15,
                "missionReward": reward
            }
        })
    }

    fn ctx() -> PassContext {
        let mut v = Vocabulary::default();
        v.nodes.insert("SolNode1".into(), "Galatea (Neptune)".into());
        v.items.insert("/Cell".into(), "Orokin Cell".into());
        PassContext::new(1000, Arc::new(v))
    }

    #[test]
    fn normalizes_with_vocabulary_and_passthrough() {
        let alert = Alerts.normalize(&raw(2_000_000, Some(json!([]))), &mut ctx()).unwrap();

        assert_eq!(alert.start, 1000);
        assert_eq!(alert.end, 2000);
        assert_eq!(alert.location, "Galatea (Neptune)");
        assert_eq!(alert.faction, "FC_GRINEER");
        assert_eq!(alert.rewards.items, Some(vec![]));
        assert_eq!(
            alert.rewards.counted_items,
            Some(vec![CountedItem { name: "Orokin Cell".into(), count: 2 }])
        );
    }

    #[test]
    fn dropped_items_become_a_nested_delete() {
        let mut c = ctx();
        let old = Alerts.normalize(&raw(2_000_000, Some(json!([]))), &mut c).unwrap();
        let new = Alerts.normalize(&raw(2_000_000, None), &mut c).unwrap();

        let patches = Alerts.diff(&old, &new).unwrap();
        assert!(patches[0].is_empty());
        assert_eq!(patches[1].context.as_deref(), Some("rewards"));
        assert_eq!(patches[1].fields.len(), 1);
        assert_eq!(patches[1].fields["items"], None);
    }

    #[test]
    fn expiry_decides_activity() {
        let alert = Alerts.normalize(&raw(2_000_000, None), &mut ctx()).unwrap();
        assert!(Alerts.is_active(&alert, 2000));
        assert!(!Alerts.is_active(&alert, 2001));
    }
}
