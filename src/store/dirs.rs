use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

/// `mkdir -p` with one in-flight creation per path.
///
/// Concurrent first writers to the same directory share a single
/// `create_dir_all`; a failed creation is retried by the next caller.
#[derive(Debug, Default)]
pub struct DirCache {
    pending: Mutex<HashMap<PathBuf, Arc<OnceCell<()>>>>,
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure(&self, dir: &Path) -> io::Result<()> {
        let cell = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.entry(dir.to_path_buf()).or_default().clone()
        };

        cell.get_or_try_init(|| async {
            log::debug!("[STORE] creating directory {}", dir.display());
            tokio::fs::create_dir_all(dir).await
        })
        .await?;

        Ok(())
    }
}
