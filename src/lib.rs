//! Incremental mirror of a periodically published game-state snapshot.
//!
//! - `engine`: pure diff, patch and history primitives
//! - `store`: log-structured tables with write-then-rename compaction
//! - `reconcile`: the generic snapshot-vs-store loop and its pipeline
//! - `domain`: concrete categories and vocabulary
//! - `polling`: the fetcher that drives everything

pub mod config;
pub mod domain;
pub mod engine;
pub mod polling;
pub mod reconcile;
pub mod store;

use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::domain::invasions::DEFAULT_SCORE_THRESHOLD;
use crate::domain::{Alerts, Bounties, Invasions, Vocabulary, VoidTraders};
use crate::reconcile::Pipeline;
use crate::store::Database;

/// Builds a pipeline with every known category and opens the configured ones.
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let vocabulary = match &config.vocabulary {
        Some(path) => Vocabulary::load(path).await?,
        None => Vocabulary::default(),
    };

    let root = config.storage_root();
    match &root {
        Some(root) => log::info!("[STORE] storing under {}", root.display()),
        None => log::warn!("[STORE] no storage root, tables are memory only"),
    }
    let database = Database::new(&config.database, root, config.compaction_threshold);

    let mut pipeline = Pipeline::new(database, Arc::new(vocabulary))
        .with(Alerts)
        .with(Invasions::new(
            config.history_threshold("invasions", DEFAULT_SCORE_THRESHOLD),
        ))
        .with(VoidTraders)
        .with(Bounties);
    pipeline.configure(&config.categories).await?;
    Ok(pipeline)
}
