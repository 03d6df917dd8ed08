use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::domain::wire;
use crate::domain::{Alert, Alerts, Bounties, Invasion, Invasions, Vocabulary};
use crate::engine::types::Reward;
use crate::reconcile::{Category, PassContext, Pipeline};
use crate::store::{Database, DirCache, Table, TableFiles};

// =========================================================================
// Helpers
// =========================================================================

fn ms(secs: i64) -> Value {
    json!({"$date": {"$numberLong": (secs * 1000).to_string()}})
}

fn alert(id: &str, end: i64, items: Option<Value>) -> Value {
    let mut reward = json!({"credits": 7000});
    if let Some(items) = items {
        reward["items"] = items;
    }
    json!({
        "_id": {"$oid": id},
        "Activation": ms(900),
        "Expiry": ms(end),
        "MissionInfo": {
            "location": "SolNode1",
            "missionType": "MT_SURVIVAL",
            "faction": "FC_INFESTATION",
            "minEnemyLevel": 20,
            "maxEnemyLevel": 25,
            "missionReward": reward
        }
    })
}

fn invasion(id: &str, score: i64) -> Value {
    json!({
        "_id": {"$oid": id},
        "Activation": ms(500),
        "Node": "SolNode20",
        "Count": score,
        "Goal": 1000,
        "Completed": false,
        "AttackerMissionInfo": {"faction": "FC_GRINEER"},
        "DefenderMissionInfo": {"faction": "FC_CORPUS"}
    })
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn pipeline(root: Option<&TempDir>, active: &[&str]) -> Pipeline {
    let mut vocabulary = Vocabulary::default();
    vocabulary.reward_tables.insert(
        "/Tables/A".into(),
        vec![vec![Reward { name: "Endo".into(), kind: "item".into(), count: 150, chance: 1.0 }]],
    );

    let database = Database::new("pc", root.map(|t| t.path().to_path_buf()), 50);
    let mut pipeline = Pipeline::new(database, Arc::new(vocabulary))
        .with(Alerts)
        .with(Invasions::new(0.01))
        .with(Bounties)
        .with(Broken);
    pipeline.configure(&set(active)).await.unwrap();
    pipeline
}

/// A category whose entries never normalize.
struct Broken;

impl Category for Broken {
    type Record = Value;

    fn name(&self) -> &str {
        "broken"
    }

    fn entries<'a>(&self, snapshot: &'a Value) -> Vec<&'a Value> {
        wire::array(snapshot, "Alerts")
    }

    fn id(&self, raw: &Value) -> Option<String> {
        wire::oid(raw)
    }

    fn normalize(&self, _raw: &Value, _ctx: &mut PassContext) -> Result<Value> {
        anyhow::bail!("unreadable entry")
    }

    fn is_active(&self, _record: &Value, _now: i64) -> bool {
        true
    }

    fn diff_fields(&self) -> &'static [&'static str] {
        &[]
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn alert_lifecycle_with_nested_reward_delete() {
    let tmp = TempDir::new().unwrap();
    let mut p = pipeline(Some(&tmp), &["alerts"]).await;

    let first = json!({"Time": 1000, "Alerts": [alert("a1", 1300, Some(json!([])))]});
    let report = p.apply(&first, 1000).await;
    assert_eq!(report.changes["alerts"].added, vec!["a1"]);

    let stored = p.database().table::<Alert>("alerts").unwrap().get("a1").unwrap().clone();
    assert_eq!(stored.end, 1300);
    assert_eq!(stored.rewards.items, Some(vec![]));

    let second = json!({"Time": 1030, "Alerts": [alert("a1", 1300, None)]});
    let report = p.apply(&second, 1030).await;
    assert_eq!(report.changes["alerts"].updated, vec!["a1"]);

    let table = p.database().table::<Alert>("alerts").unwrap();
    let stored = table.get("a1").unwrap().clone();
    assert_eq!(stored.rewards.items, None);
    assert_eq!(stored.rewards.credits, 7000);
    assert_eq!(table.last_update(), 1030);

    p.sync().await;
    let temp = std::fs::read_to_string(tmp.path().join("pc").join("alerts.db.tmp")).unwrap();
    assert!(temp.lines().any(|l| l.contains("\"__context\":\"rewards\"") && l.contains("\"items\":null")));

    let reopened = Table::<Alert>::open(
        "alerts",
        Some(TableFiles::new(tmp.path(), "pc", "alerts")),
        Arc::new(DirCache::new()),
        50,
    )
    .await;
    assert_eq!(reopened.get("a1"), Some(&stored));
}

#[tokio::test]
async fn unchanged_snapshot_writes_nothing() {
    let mut p = pipeline(None, &["alerts"]).await;
    let snap = json!({"Alerts": [alert("a1", 1300, Some(json!(["/Reactor"])))]});

    p.apply(&snap, 1000).await;
    let report = p.apply(&snap, 1010).await;
    assert!(report.changes["alerts"].is_empty());
}

#[tokio::test]
async fn expired_and_missing_entries_are_archived() {
    let tmp = TempDir::new().unwrap();
    let mut p = pipeline(Some(&tmp), &["alerts"]).await;

    let snap = json!({"Alerts": [alert("a1", 1300, None), alert("a2", 5000, None)]});
    p.apply(&snap, 1000).await;

    let later = json!({"Alerts": [alert("a1", 1300, None)]});
    let report = p.apply(&later, 1400).await;

    let mut removed = report.changes["alerts"].removed.clone();
    removed.sort();
    assert_eq!(removed, vec!["a1", "a2"]);
    assert!(p.database().table::<Alert>("alerts").unwrap().is_empty());

    p.sync().await;
    let archive = std::fs::read_to_string(tmp.path().join("pc").join("alerts.db")).unwrap();
    assert_eq!(archive.lines().count(), 2);
    assert!(!tmp.path().join("pc").join("alerts.db.tmp").exists());
}

#[tokio::test]
async fn invasion_sign_flip_records_interpolated_zero() {
    let mut p = pipeline(None, &["invasions"]).await;

    p.apply(&json!({"Invasions": [invasion("i1", -100)]}), 1000).await;
    let report = p.apply(&json!({"Invasions": [invasion("i1", 100)]}), 1060).await;
    assert_eq!(report.changes["invasions"].updated, vec!["i1"]);

    let inv: &Invasion = p.database().table("invasions").unwrap().get("i1").unwrap();
    assert_eq!(inv.score, 100.0);

    let zero = inv
        .score_history
        .iter()
        .find(|pt| pt.value() == 0.0)
        .expect("zero crossing point");
    assert!(!zero.is_volatile());
    assert!(zero.timestamp() > 1000 && zero.timestamp() < 1060);
    assert!(inv.score_history.last().unwrap().is_volatile());
}

#[tokio::test]
async fn invasion_reaching_goal_is_finalized() {
    let mut p = pipeline(None, &["invasions"]).await;

    p.apply(&json!({"Invasions": [invasion("i1", 400)]}), 1000).await;
    let report = p.apply(&json!({"Invasions": [invasion("i1", 1000)]}), 1100).await;

    assert_eq!(report.changes["invasions"].removed, vec!["i1"]);
    assert!(p.database().table::<Invasion>("invasions").unwrap().is_empty());
}

#[tokio::test]
async fn failing_category_does_not_stop_the_pass() {
    let mut p = pipeline(None, &["alerts", "broken"]).await;

    let report = p.apply(&json!({"Alerts": [alert("a1", 1300, None)]}), 1000).await;

    assert_eq!(report.failed, vec!["broken"]);
    assert_eq!(report.changes["alerts"].added, vec!["a1"]);
    assert!(p.database().table::<Value>("broken").unwrap().is_empty());
}

#[tokio::test]
async fn entity_rewards_are_rebuilt_every_pass() {
    let mut p = pipeline(None, &["bounties"]).await;
    let board = json!({"SyndicateMissions": [{
        "_id": {"$oid": "b1"},
        "Activation": ms(900),
        "Expiry": ms(5000),
        "Tag": "CetusSyndicate",
        "Jobs": [{"jobType": "/Jobs/Capture", "rewards": "/Tables/A"}]
    }]});

    p.apply(&board, 1000).await;
    assert_eq!(p.entity_rewards().len(), 1);

    p.apply(&json!({}), 1010).await;
    assert!(p.entity_rewards().is_empty());
}

#[tokio::test]
async fn expired_boards_do_not_fill_entity_rewards() {
    let mut p = pipeline(None, &["bounties"]).await;
    let board = json!({"SyndicateMissions": [{
        "_id": {"$oid": "b1"},
        "Activation": ms(900),
        "Expiry": ms(950),
        "Tag": "CetusSyndicate",
        "Jobs": [{"jobType": "/Jobs/Capture", "rewards": "/Tables/A"}]
    }]});

    let report = p.apply(&board, 1000).await;
    assert!(report.changes["bounties"].is_empty());
    assert!(p.entity_rewards().is_empty());
}

#[tokio::test]
async fn configure_opens_and_drops_tables() {
    let mut p = pipeline(None, &["alerts", "invasions", "nonsense"]).await;
    assert!(p.database().contains("alerts"));
    assert!(p.database().contains("invasions"));
    assert!(!p.database().contains("nonsense"));
    assert!(!p.database().contains("bounties"));

    p.configure(&set(&["alerts"])).await.unwrap();
    assert!(!p.database().contains("invasions"));

    let report = p.apply(&json!({"Invasions": [invasion("i1", 5)]}), 1000).await;
    assert!(!report.changes.contains_key("invasions"));
}

#[tokio::test]
async fn vocabulary_swap_applies_to_next_pass() {
    let mut p = pipeline(None, &["alerts"]).await;
    p.apply(&json!({"Alerts": [alert("a1", 1300, None)]}), 1000).await;
    assert_eq!(p.database().table::<Alert>("alerts").unwrap().get("a1").unwrap().location, "SolNode1");

    let mut v = Vocabulary::default();
    v.nodes.insert("SolNode1".into(), "Galatea (Neptune)".into());
    p.set_vocabulary(Arc::new(v));

    let report = p.apply(&json!({"Alerts": [alert("a1", 1300, None)]}), 1010).await;
    assert_eq!(report.changes["alerts"].updated, vec!["a1"]);
    assert_eq!(
        p.database().table::<Alert>("alerts").unwrap().get("a1").unwrap().location,
        "Galatea (Neptune)"
    );
}
