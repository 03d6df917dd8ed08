//! Append buffers and on-disk files of one table.
//!
//! Two logs per table:
//! * **archive** (`<table>.db`): finalized records, append only, never replayed.
//! * **temp** (`<table>.db.tmp`): active records and their patches.
//!
//! Each log has a pending buffer and a busy flag. While a write is in flight
//! new lines keep accumulating in the buffer; a failed write puts its data
//! back in front of whatever arrived meanwhile.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::store::dirs::DirCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFiles {
    pub archive: PathBuf,
    pub temp: PathBuf,
    pub compact: PathBuf,
}

impl TableFiles {
    /// `<root>/<database>/<table>.db` and its `.tmp` / `.tmp1` siblings.
    pub fn new(root: &Path, database: &str, table: &str) -> Self {
        let archive = root.join(database).join(format!("{table}.db"));
        let temp = PathBuf::from(format!("{}.tmp", archive.display()));
        let compact = PathBuf::from(format!("{}.tmp1", archive.display()));
        Self { archive, temp, compact }
    }

    fn dir(&self) -> Option<&Path> {
        self.archive.parent()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Archive,
    Temp,
}

#[derive(Debug, Default)]
struct Buffer {
    pending: String,
    busy: bool,
}

fn lock(buf: &Mutex<Buffer>) -> MutexGuard<'_, Buffer> {
    buf.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct TableLog {
    table: String,
    files: Option<TableFiles>,
    dirs: Arc<DirCache>,
    archive: Mutex<Buffer>,
    temp: Mutex<Buffer>,
    compacting: AtomicBool,
    dirty: AtomicBool,
    patches: AtomicUsize,
}

impl TableLog {
    /// `files == None` turns every append into a no-op.
    pub fn new(table: impl Into<String>, files: Option<TableFiles>, dirs: Arc<DirCache>) -> Self {
        Self {
            table: table.into(),
            files,
            dirs,
            archive: Mutex::new(Buffer::default()),
            temp: Mutex::new(Buffer::default()),
            compacting: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            patches: AtomicUsize::new(0),
        }
    }

    pub fn files(&self) -> Option<&TableFiles> {
        self.files.as_ref()
    }

    pub fn is_persistent(&self) -> bool {
        self.files.is_some()
    }

    fn buffer(&self, kind: LogKind) -> &Mutex<Buffer> {
        match kind {
            LogKind::Archive => &self.archive,
            LogKind::Temp => &self.temp,
        }
    }

    pub fn push(&self, kind: LogKind, line: &str) {
        if self.files.is_none() {
            return;
        }
        lock(self.buffer(kind)).pending.push_str(line);
    }

    /// Buffered lines, or a compaction that is owed.
    pub fn has_pending(&self) -> bool {
        !lock(&self.archive).pending.is_empty()
            || !lock(&self.temp).pending.is_empty()
            || (self.is_persistent() && self.dirty.load(Ordering::Relaxed))
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, kind: LogKind) -> String {
        lock(self.buffer(kind)).pending.clone()
    }

    // =================================================================
    // Compaction bookkeeping
    // =================================================================

    pub fn note_patch(&self) {
        self.patches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_patch_count(&self, n: usize) {
        self.patches.store(n, Ordering::Relaxed);
    }

    pub fn patch_count(&self) -> usize {
        self.patches.load(Ordering::Relaxed)
    }

    /// The temp log holds records that are no longer active.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Relaxed);
    }

    pub fn should_compact(&self, threshold: usize) -> bool {
        self.is_persistent()
            && (self.dirty.load(Ordering::Relaxed) || self.patch_count() >= threshold)
    }

    // =================================================================
    // Flush
    // =================================================================

    pub async fn flush(&self) {
        self.flush_log(LogKind::Archive).await;
        self.flush_log(LogKind::Temp).await;
    }

    async fn flush_log(&self, kind: LogKind) {
        if let Some(data) = self.claim(kind) {
            self.write_claimed(kind, data).await;
        }
    }

    /// Marks the buffer busy and takes its lines.
    ///
    /// `None` when persistence is off, nothing is buffered or another write
    /// already holds the buffer. In that case new lines simply wait.
    pub(crate) fn claim(&self, kind: LogKind) -> Option<String> {
        self.files.as_ref()?;

        let mut buf = lock(self.buffer(kind));
        if buf.busy || buf.pending.is_empty() {
            return None;
        }
        buf.busy = true;
        Some(std::mem::take(&mut buf.pending))
    }

    /// Appends claimed lines and releases the buffer. On failure the lines go
    /// back in front of whatever was buffered meanwhile.
    pub(crate) async fn write_claimed(&self, kind: LogKind, data: String) {
        let Some(files) = &self.files else {
            return;
        };

        let path = match kind {
            LogKind::Archive => &files.archive,
            LogKind::Temp => &files.temp,
        };
        let result = self.append(path, &data).await;

        let mut buf = lock(self.buffer(kind));
        buf.busy = false;
        match result {
            Ok(()) => {
                log::trace!("[STORE] {}: appended {} bytes to {}", self.table, data.len(), path.display());
            }
            Err(err) => {
                log::error!("[STORE] {}: append to {} failed: {err:#}", self.table, path.display());
                buf.pending.insert_str(0, &data);
            }
        }
    }

    async fn append(&self, path: &Path, data: &str) -> Result<()> {
        if let Some(dir) = path.parent() {
            self.dirs.ensure(dir).await.context("create table directory")?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .context("open for append")?;
        file.write_all(data.as_bytes()).await.context("write")?;
        file.flush().await.context("flush")?;
        Ok(())
    }

    // =================================================================
    // Compaction
    // =================================================================

    /// Claims the temp log for a rewrite.
    ///
    /// Returns the pending temp lines, which the snapshot supersedes, or
    /// `None` when persistence is off or the temp log is busy.
    pub fn begin_compaction(&self) -> Option<String> {
        self.files.as_ref()?;

        if self.compacting.swap(true, Ordering::AcqRel) {
            log::warn!("[STORE] {}: compaction already in flight, skipping", self.table);
            return None;
        }

        let mut temp = lock(&self.temp);
        if temp.busy {
            self.compacting.store(false, Ordering::Release);
            log::warn!("[STORE] {}: temp append in flight, compaction deferred", self.table);
            return None;
        }

        temp.busy = true;
        self.dirty.store(false, Ordering::Relaxed);
        self.patches.store(0, Ordering::Relaxed);
        Some(std::mem::take(&mut temp.pending))
    }

    /// Writes `snapshot` as the new temp log and releases the claim.
    pub async fn finish_compaction(&self, snapshot: String, superseded: String) {
        let result = self.rewrite(&snapshot).await;

        {
            let mut temp = lock(&self.temp);
            temp.busy = false;
            if let Err(err) = &result {
                log::error!("[STORE] {}: compaction failed: {err:#}", self.table);
                temp.pending.insert_str(0, &superseded);
                self.dirty.store(true, Ordering::Relaxed);
            }
        }

        if result.is_ok() {
            log::debug!("[STORE] {}: compacted temp log ({} bytes)", self.table, snapshot.len());
        }
        self.compacting.store(false, Ordering::Release);
    }

    async fn rewrite(&self, snapshot: &str) -> Result<()> {
        let Some(files) = &self.files else {
            return Ok(());
        };

        if snapshot.is_empty() {
            return match tokio::fs::remove_file(&files.temp).await {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err).context("remove temp log"),
            };
        }

        if let Some(dir) = files.dir() {
            self.dirs.ensure(dir).await.context("create table directory")?;
        }
        tokio::fs::write(&files.compact, snapshot)
            .await
            .context("write compacted log")?;
        tokio::fs::rename(&files.compact, &files.temp)
            .await
            .context("replace temp log")?;
        Ok(())
    }
}
