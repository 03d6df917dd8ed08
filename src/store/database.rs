use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::task::JoinHandle;

use crate::store::dirs::DirCache;
use crate::store::logs::TableFiles;
use crate::store::table::Table;
use crate::store::Record;

/// Type-erased view of a [`Table`] so one database can hold every category.
pub trait StoredTable: Send + Sync {
    fn name(&self) -> &str;
    fn len(&self) -> usize;
    fn is_ready(&self) -> bool;
    fn has_pending(&self) -> bool;
    /// Compacts if due, then spawns the buffer flushes.
    fn persist(&self) -> Vec<JoinHandle<()>>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: Record> StoredTable for Table<R> {
    fn name(&self) -> &str {
        Table::name(self)
    }

    fn len(&self) -> usize {
        Table::len(self)
    }

    fn is_ready(&self) -> bool {
        Table::is_ready(self)
    }

    fn has_pending(&self) -> bool {
        Table::has_pending(self)
    }

    fn persist(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);
        if self.needs_clean() {
            if let Some(rewrite) = self.clean() {
                handles.push(tokio::spawn(rewrite));
            }
        }
        handles.push(tokio::spawn(self.flush()));
        handles
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A named collection of tables stored under `<root>/<name>/`.
pub struct Database {
    name: String,
    root: Option<PathBuf>,
    dirs: Arc<DirCache>,
    compaction_threshold: usize,
    tables: BTreeMap<String, Box<dyn StoredTable>>,
    /// Background writes, tagged with the table that spawned them.
    in_flight: Vec<(String, JoinHandle<()>)>,
}

/// Flush rounds before giving up on a table that keeps failing to write.
const SYNC_ROUNDS: usize = 3;

impl Database {
    /// `root == None` keeps every table in memory only.
    pub fn new(name: impl Into<String>, root: Option<PathBuf>, compaction_threshold: usize) -> Self {
        Self {
            name: name.into(),
            root,
            dirs: Arc::new(DirCache::new()),
            compaction_threshold,
            tables: BTreeMap::new(),
            in_flight: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_persistent(&self) -> bool {
        self.root.is_some()
    }

    pub fn files_for(&self, table: &str) -> Option<TableFiles> {
        self.root
            .as_deref()
            .map(|root| TableFiles::new(root, &self.name, table))
    }

    /// Opens `name` unless it is already resident.
    pub async fn open_table<R: Record>(&mut self, name: &str) -> Result<()> {
        if let Some(existing) = self.tables.get(name) {
            if existing.as_any().is::<Table<R>>() {
                return Ok(());
            }
            bail!("table {name} is already open with another record type");
        }

        let table = Table::<R>::open(
            name,
            self.files_for(name),
            self.dirs.clone(),
            self.compaction_threshold,
        )
        .await;
        self.tables.insert(name.to_string(), Box::new(table));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn table<R: Record>(&self, name: &str) -> Option<&Table<R>> {
        self.tables.get(name)?.as_any().downcast_ref()
    }

    pub fn table_mut<R: Record>(&mut self, name: &str) -> Option<&mut Table<R>> {
        self.tables.get_mut(name)?.as_any_mut().downcast_mut()
    }

    /// Drops `name` from memory once everything it buffered reached disk.
    /// Files stay.
    ///
    /// Nothing of the dropped table is still writing when this returns, so
    /// reopening the same name right away replays a complete temp log.
    pub async fn drop_table(&mut self, name: &str) -> bool {
        let Some(table) = self.tables.remove(name) else {
            return false;
        };

        log::info!("[STORE] {}: dropping table {name}", self.name);
        for _ in 0..SYNC_ROUNDS {
            let handles = table.persist();
            self.track(name, handles);
            self.join(Some(name)).await;
            if !table.has_pending() {
                return true;
            }
        }

        log::error!("[STORE] {}: {name} dropped with unwritten data", self.name);
        true
    }

    /// Drops every table whose name is not in `keep`.
    pub async fn retain(&mut self, keep: &BTreeSet<String>) {
        let stale: Vec<String> = self
            .tables
            .keys()
            .filter(|name| !keep.contains(*name))
            .cloned()
            .collect();
        for name in stale {
            self.drop_table(&name).await;
        }
    }

    fn track(&mut self, table: &str, handles: Vec<JoinHandle<()>>) {
        self.in_flight
            .extend(handles.into_iter().map(|h| (table.to_string(), h)));
    }

    /// Waits for the background writes of `table`, or of every table.
    async fn join(&mut self, table: Option<&str>) {
        let (wait, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.in_flight)
            .into_iter()
            .partition(|(owner, _)| table.map_or(true, |t| owner.as_str() == t));
        self.in_flight = keep;

        for (owner, handle) in wait {
            if let Err(err) = handle.await {
                log::error!("[STORE] {}: {owner}: write task failed: {err}", self.name);
            }
        }
    }

    /// Starts background compaction and flushes for every table.
    pub fn flush(&mut self) {
        self.in_flight.retain(|(_, h)| !h.is_finished());
        let spawned: Vec<(String, Vec<JoinHandle<()>>)> = self
            .tables
            .iter()
            .map(|(name, table)| (name.clone(), table.persist()))
            .collect();
        for (name, handles) in spawned {
            self.track(&name, handles);
        }
    }

    /// Flushes and waits until nothing is buffered (or a few rounds passed).
    pub async fn sync(&mut self) {
        for _ in 0..SYNC_ROUNDS {
            self.flush();
            self.join(None).await;
            if !self.tables.values().any(|t| t.has_pending()) {
                break;
            }
        }
    }
}
