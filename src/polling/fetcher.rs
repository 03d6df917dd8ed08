//! Polling state machine.
//!
//! ```text
//! Idle -> Scheduled -> InFlight -> Scheduled   (accepted)
//!                              \-> Backoff     (any failure)
//! ```
//!
//! A single deadline governs the next request; scheduling replaces it.
//! Accepted snapshots run a full reconciliation pass before the next
//! request is scheduled.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::polling::api::{FetchError, SnapshotSource};
use crate::polling::decode::decode;
use crate::reconcile::{PassReport, Pipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub poll_interval: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    /// Taken off the backoff after every accepted snapshot.
    pub backoff_decrement: Duration,
    pub request_timeout: Duration,
    /// Top-level field holding the snapshot time.
    pub timestamp_key: String,
    pub flush_interval: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            min_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_decrement: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            timestamp_key: "Time".to_string(),
            flush_interval: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Scheduled,
    InFlight,
    Backoff,
}

/// Messages accepted by [`Fetcher::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetcherControl {
    PollNow,
    Reschedule(Duration),
    Stop,
}

pub struct Fetcher<S> {
    source: S,
    pipeline: Pipeline,
    config: FetcherConfig,
    state: FetchState,
    backoff: Duration,
    deadline: Option<Instant>,
    failures: u64,
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl<S: SnapshotSource> Fetcher<S> {
    pub fn new(source: S, pipeline: Pipeline, config: FetcherConfig) -> Self {
        Self {
            source,
            pipeline,
            backoff: config.min_backoff,
            config,
            state: FetchState::Idle,
            deadline: None,
            failures: 0,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Delay applied after the next failure.
    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consecutive failed polls.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    pub fn into_pipeline(self) -> Pipeline {
        self.pipeline
    }

    /// Arms the timer `delay` from now, replacing any pending deadline.
    pub fn schedule(&mut self, delay: Duration) {
        self.deadline = Some(Instant::now() + delay);
        if self.state == FetchState::Idle {
            self.state = FetchState::Scheduled;
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.state = FetchState::Idle;
    }

    async fn fetch_snapshot(&self) -> Result<(Value, i64), FetchError> {
        let response = tokio::time::timeout(self.config.request_timeout, self.source.fetch())
            .await
            .map_err(|_| FetchError::Timeout)??;

        let (snapshot, timestamp) = decode(&response, &self.config.timestamp_key)?;
        let current = self.pipeline.now();
        if timestamp < current {
            return Err(FetchError::Stale {
                received: timestamp,
                current,
            });
        }
        Ok((snapshot, timestamp))
    }

    /// One request, and on acceptance one reconciliation pass.
    pub async fn poll_once(&mut self) -> Result<PassReport, FetchError> {
        self.state = FetchState::InFlight;
        self.deadline = None;

        match self.fetch_snapshot().await {
            Ok((snapshot, timestamp)) => {
                log::info!("[FETCH] accepted snapshot @{timestamp}");
                let report = self.pipeline.apply(&snapshot, timestamp).await;

                self.failures = 0;
                self.backoff = self
                    .backoff
                    .saturating_sub(self.config.backoff_decrement)
                    .max(self.config.min_backoff);
                self.state = FetchState::Scheduled;
                self.schedule(self.config.poll_interval);
                Ok(report)
            }
            Err(err) => {
                self.failures += 1;
                log::warn!(
                    "[FETCH] poll failed ({} in a row): {err}; retrying in {:?}",
                    self.failures,
                    self.backoff
                );
                self.state = FetchState::Backoff;
                self.schedule(self.backoff);
                self.backoff = (self.backoff * 2).min(self.config.max_backoff);
                Err(err)
            }
        }
    }

    /// Drives the fetcher until [`FetcherControl::Stop`] or the channel
    /// closes, flushing the database on `flush_interval`. Returns the fetcher
    /// so the caller can sync the pipeline.
    pub async fn run(mut self, mut control: mpsc::Receiver<FetcherControl>) -> Self {
        if self.deadline.is_none() {
            self.schedule(Duration::ZERO);
        }

        let every = self.config.flush_interval.max(Duration::from_millis(1));
        let mut flush = tokio::time::interval_at(Instant::now() + every, every);
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("[FETCH] started");
        loop {
            tokio::select! {
                _ = wait_for(self.deadline) => {
                    if let Ok(report) = self.poll_once().await {
                        log::debug!("[FETCH] pass @{} done, next in {:?}", report.timestamp, self.config.poll_interval);
                    }
                }
                _ = flush.tick() => self.pipeline.flush(),
                cmd = control.recv() => match cmd {
                    Some(FetcherControl::PollNow) => self.schedule(Duration::ZERO),
                    Some(FetcherControl::Reschedule(delay)) => self.schedule(delay),
                    Some(FetcherControl::Stop) | None => break,
                },
            }
        }

        self.cancel();
        log::info!("[FETCH] stopped");
        self
    }
}
