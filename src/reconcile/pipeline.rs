//! Runs every configured category against a snapshot.
//!
//! Each category is a separate step; the pipeline yields to the scheduler
//! between steps and a failing step is logged without stopping the others.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::domain::vocabulary::Vocabulary;
use crate::engine::types::RewardTier;
use crate::reconcile::{reconcile, Category, ChangeSet, PassContext};
use crate::store::Database;

/// Object-safe wrapper around a [`Category`].
#[async_trait]
trait Step: Send + Sync {
    fn name(&self) -> &str;
    async fn open(&self, db: &mut Database) -> Result<()>;
    fn run(&self, db: &mut Database, snapshot: &Value, ctx: &mut PassContext)
        -> Result<Option<ChangeSet>>;
}

struct Reader<C>(C);

#[async_trait]
impl<C: Category> Step for Reader<C> {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn open(&self, db: &mut Database) -> Result<()> {
        db.open_table::<C::Record>(self.0.name()).await
    }

    fn run(
        &self,
        db: &mut Database,
        snapshot: &Value,
        ctx: &mut PassContext,
    ) -> Result<Option<ChangeSet>> {
        let Some(table) = db.table_mut::<C::Record>(self.0.name()) else {
            return Ok(None);
        };
        if !table.is_ready() {
            log::warn!("[PIPELINE] {}: table not ready, skipping", self.0.name());
            return Ok(None);
        }
        reconcile(&self.0, table, snapshot, ctx).map(Some)
    }
}

/// Per-category outcome of one pass.
#[derive(Debug, Default)]
pub struct PassReport {
    pub timestamp: i64,
    pub changes: BTreeMap<String, ChangeSet>,
    pub failed: Vec<String>,
}

pub struct Pipeline {
    database: Database,
    steps: Vec<Box<dyn Step>>,
    vocabulary: Arc<Vocabulary>,
    entity_rewards: BTreeMap<String, Vec<RewardTier>>,
    now: i64,
}

impl Pipeline {
    pub fn new(database: Database, vocabulary: Arc<Vocabulary>) -> Self {
        Self {
            database,
            steps: Vec::new(),
            vocabulary,
            entity_rewards: BTreeMap::new(),
            now: 0,
        }
    }

    /// Makes a category available. It runs once [`Pipeline::configure`]
    /// activates it.
    pub fn register<C: Category>(&mut self, category: C) {
        self.steps.push(Box::new(Reader(category)));
    }

    pub fn with<C: Category>(mut self, category: C) -> Self {
        self.register(category);
        self
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.name())
    }

    /// Opens the tables named in `active` and drops every other table.
    pub async fn configure(&mut self, active: &BTreeSet<String>) -> Result<()> {
        for name in active {
            if !self.steps.iter().any(|s| s.name() == name) {
                log::warn!("[PIPELINE] unknown category {name} ignored");
            }
        }

        for step in &self.steps {
            if active.contains(step.name()) {
                step.open(&mut self.database).await?;
            }
        }
        self.database.retain(active).await;
        Ok(())
    }

    /// Swaps the lookup tables used by the next pass.
    pub fn set_vocabulary(&mut self, vocabulary: Arc<Vocabulary>) {
        self.vocabulary = vocabulary;
    }

    pub fn vocabulary(&self) -> &Arc<Vocabulary> {
        &self.vocabulary
    }

    /// Timestamp of the last applied snapshot.
    pub fn now(&self) -> i64 {
        self.now
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.database
    }

    /// Reward tables collected during the last pass.
    pub fn entity_rewards(&self) -> &BTreeMap<String, Vec<RewardTier>> {
        &self.entity_rewards
    }

    /// One full reconciliation pass, then a background flush.
    pub async fn apply(&mut self, snapshot: &Value, timestamp: i64) -> PassReport {
        self.now = timestamp;
        let mut ctx = PassContext::new(timestamp, self.vocabulary.clone());
        let mut report = PassReport {
            timestamp,
            ..PassReport::default()
        };

        for step in &self.steps {
            if !self.database.contains(step.name()) {
                continue;
            }

            match step.run(&mut self.database, snapshot, &mut ctx) {
                Ok(Some(changes)) => {
                    report.changes.insert(step.name().to_string(), changes);
                }
                Ok(None) => {}
                Err(err) => {
                    log::error!("[PIPELINE] {} failed: {err:#}", step.name());
                    report.failed.push(step.name().to_string());
                }
            }

            tokio::task::yield_now().await;
        }

        self.entity_rewards = ctx.entity_rewards;
        self.database.flush();

        let (added, updated, removed) = report.changes.values().fold((0, 0, 0), |acc, c| {
            (acc.0 + c.added.len(), acc.1 + c.updated.len(), acc.2 + c.removed.len())
        });
        log::info!(
            "[PIPELINE] pass @{timestamp}: +{added} ~{updated} -{removed} ({} failed)",
            report.failed.len()
        );
        report
    }

    pub fn flush(&mut self) {
        self.database.flush();
    }

    /// Waits for everything buffered to reach disk.
    pub async fn sync(&mut self) {
        self.database.sync().await;
    }
}
