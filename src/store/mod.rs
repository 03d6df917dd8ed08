//! Log-structured record store.
//!
//! Each table keeps its active records in memory and mirrors them to two
//! append-only files. The temp log is replayed on startup and compacted by
//! write-then-rename; the archive log only ever grows.

pub mod database;
pub mod dirs;
pub mod logs;
pub mod replay;
pub mod table;


use serde::de::DeserializeOwned;
use serde::Serialize;

pub use database::{Database, StoredTable};
pub use dirs::DirCache;
pub use logs::TableFiles;
pub use table::Table;

/// Anything a table can hold.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Record for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Default number of patches between temp log rewrites.
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 50;
