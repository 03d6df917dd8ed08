//! Snapshot acquisition.
//!
//! `api` is the I/O seam, `http` the production source, `mock` a scripted
//! source for tests. `fetcher` owns the timer, the backoff and the staleness
//! guard, and hands accepted snapshots to the reconciliation pipeline.

pub mod api;
pub mod decode;
pub mod fetcher;
pub mod http;
pub mod mock;


pub use api::{FetchError, RawResponse, SnapshotSource};
pub use fetcher::{FetchState, Fetcher, FetcherConfig, FetcherControl};
pub use http::HttpSource;
pub use mock::{MockReply, MockSource};
