use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use serde_json::Value;

use crate::engine::patch::Patch;
use crate::store::dirs::DirCache;
use crate::store::logs::{LogKind, TableFiles, TableLog};
use crate::store::replay::{encode_line, replay};
use crate::store::Record;

/// Live records of one category plus their append logs.
///
/// The table is the sole owner of its `id -> record` map. All mutations happen
/// on the owning task; only the file writes run in the background.
#[derive(Debug)]
pub struct Table<R> {
    name: String,
    records: BTreeMap<String, R>,
    log: Arc<TableLog>,
    ready: bool,
    last_update: i64,
    compaction_threshold: usize,
}

impl<R: Record> Table<R> {
    /// A table without files. Always ready.
    pub fn in_memory(name: impl Into<String>, compaction_threshold: usize) -> Self {
        let name = name.into();
        Self {
            log: Arc::new(TableLog::new(name.clone(), None, Arc::new(DirCache::new()))),
            name,
            records: BTreeMap::new(),
            ready: true,
            last_update: 0,
            compaction_threshold,
        }
    }

    /// Opens a table and replays its temp log.
    ///
    /// A missing temp log is an empty table. Any other read failure leaves
    /// the table not ready so nothing overwrites the file.
    pub async fn open(
        name: impl Into<String>,
        files: Option<TableFiles>,
        dirs: Arc<DirCache>,
        compaction_threshold: usize,
    ) -> Self {
        let name = name.into();
        let temp_path = files.as_ref().map(|f| f.temp.clone());
        let mut table = Self {
            log: Arc::new(TableLog::new(name.clone(), files, dirs)),
            name,
            records: BTreeMap::new(),
            ready: false,
            last_update: 0,
            compaction_threshold,
        };

        let Some(path) = temp_path else {
            table.ready = true;
            return table;
        };

        match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                table.load(&text);
                table.ready = true;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                table.ready = true;
            }
            Err(err) => {
                log::error!("[TABLE] {}: cannot read {}: {err}", table.name, path.display());
            }
        }

        log::info!(
            "[TABLE] {}: opened with {} active records (ready={})",
            table.name,
            table.records.len(),
            table.ready
        );
        table
    }

    fn load(&mut self, text: &str) {
        let replayed = replay(&self.name, text);
        for (id, obj) in replayed.records {
            match serde_json::from_value::<R>(Value::Object(obj)) {
                Ok(record) => {
                    self.records.insert(id, record);
                }
                Err(err) => {
                    log::error!("[TABLE] {}: dropping unreadable record {id}: {err}", self.name);
                }
            }
        }
        self.log.set_patch_count(replayed.patches);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    /// Never moves backwards.
    pub fn set_last_update(&mut self, ts: i64) {
        self.last_update = self.last_update.max(ts);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut R> {
        self.records.get_mut(id)
    }

    pub fn get_all(&self) -> Vec<&R> {
        self.records.values().collect()
    }

    /// Snapshot of the active ids.
    pub fn id_set(&self) -> BTreeSet<String> {
        self.records.keys().cloned().collect()
    }

    pub fn add(&mut self, id: &str, record: R, persist: bool) {
        if persist {
            self.push_record(LogKind::Temp, id, &record);
        }
        self.records.insert(id.to_string(), record);
    }

    /// Logs `partial` for a resident record. Unknown ids are ignored.
    pub fn update_tmp(&mut self, id: &str, partial: &Patch) {
        if !self.records.contains_key(id) {
            log::debug!("[TABLE] {}: update_tmp for unknown id {id} ignored", self.name);
            return;
        }

        match encode_line(id, &partial.to_json()) {
            Ok(line) => {
                self.log.push(LogKind::Temp, &line);
                self.log.note_patch();
            }
            Err(err) => log::error!("[TABLE] {}: {err:#}", self.name),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<R> {
        self.log.mark_dirty();
        self.records.remove(id)
    }

    /// Archives the full record and evicts it.
    pub fn move_tmp(&mut self, id: &str) -> Option<R> {
        if let Some(record) = self.records.get(id) {
            self.push_record(LogKind::Archive, id, record);
        }
        self.remove(id)
    }

    fn push_record(&self, kind: LogKind, id: &str, record: &R) {
        let line = serde_json::to_value(record)
            .context("serialize record")
            .and_then(|v| encode_line(id, &v));
        match line {
            Ok(line) => self.log.push(kind, &line),
            Err(err) => log::error!("[TABLE] {}: {id}: {err:#}", self.name),
        }
    }

    /// Writes both pending buffers. The future owns what it needs and can be
    /// spawned.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        let log = self.log.clone();
        async move { log.flush().await }
    }

    pub fn needs_clean(&self) -> bool {
        self.log.should_compact(self.compaction_threshold)
    }

    /// Rewrites the temp log from the in-memory state.
    ///
    /// The snapshot is taken now; `None` means there is nothing to do or a
    /// rewrite is already running.
    pub fn clean(&self) -> Option<impl Future<Output = ()> + Send + 'static> {
        let superseded = self.log.begin_compaction()?;

        let mut snapshot = String::new();
        for (id, record) in &self.records {
            let line = serde_json::to_value(record)
                .context("serialize record")
                .and_then(|v| encode_line(id, &v));
            match line {
                Ok(line) => snapshot.push_str(&line),
                Err(err) => log::error!("[TABLE] {}: {id}: {err:#}", self.name),
            }
        }

        log::debug!("[TABLE] {}: compacting {} records", self.name, self.records.len());
        let log = self.log.clone();
        Some(async move { log.finish_compaction(snapshot, superseded).await })
    }

    pub fn has_pending(&self) -> bool {
        self.log.has_pending()
    }

    #[cfg(test)]
    pub(crate) fn log(&self) -> &TableLog {
        &self.log
    }
}
