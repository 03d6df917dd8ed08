use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::sync::mpsc;

use worldstate_sync::build_pipeline;
use worldstate_sync::config::Config;
use worldstate_sync::polling::{Fetcher, FetcherControl, HttpSource};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    url: Option<String>,

    /// Empty string disables persistence.
    #[arg(long)]
    storage_root: Option<PathBuf>,

    #[arg(long)]
    database: Option<String>,

    /// Comma separated category names.
    #[arg(long, value_delimiter = ',')]
    categories: Option<Vec<String>>,

    #[arg(long)]
    vocabulary: Option<PathBuf>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

impl Args {
    async fn into_config(self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path).await?,
            None => Config::default(),
        };

        if let Some(url) = self.url {
            config.url = url;
        }
        if let Some(root) = self.storage_root {
            config.storage_root = Some(root);
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(categories) = self.categories {
            config.categories = categories.into_iter().collect::<BTreeSet<_>>();
        }
        if let Some(vocabulary) = self.vocabulary {
            config.vocabulary = Some(vocabulary);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let config = Args::parse().into_config().await?;
    log::info!("[MAIN] polling {} for {:?}", config.url, config.categories);

    let pipeline = build_pipeline(&config).await?;
    let fetch = config.fetcher_config();
    let source = HttpSource::new(&config.url, fetch.request_timeout)?;
    let fetcher = Fetcher::new(source, pipeline, fetch);

    let (tx, rx) = mpsc::channel(8);
    let task = tokio::spawn(fetcher.run(rx));

    tokio::signal::ctrl_c().await?;
    log::info!("[MAIN] shutting down");
    // The fetcher also stops when the channel closes.
    let _ = tx.send(FetcherControl::Stop).await;

    let mut pipeline = task.await?.into_pipeline();
    pipeline.sync().await;
    log::info!("[MAIN] all tables flushed");
    Ok(())
}
