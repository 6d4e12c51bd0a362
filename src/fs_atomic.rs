//! Whole-file replacement through sibling temporary files.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

/// One lock per target path, shared by every writer in the process.
static PATH_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static TEMP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Waits until no other writer in this process holds `path`.
pub(crate) async fn lock_path(path: &Path) -> OwnedMutexGuard<()> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let lock = {
        let mut locks = PATH_LOCKS.lock().await;
        Arc::clone(locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))))
    };
    lock.lock_owned().await
}

/// Replaces `path` with `data`.
///
/// Readers see either the previous file or the complete new one. On error
/// the temporary file is removed and the target is left as it was. Callers
/// that race on one path should hold [`lock_path`].
pub(crate) async fn replace_file(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    if let Err(e) = write_synced(&tmp, data).await {
        discard(&tmp).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        discard(&tmp).await;
        return Err(e);
    }
    Ok(())
}

/// Unique per write: pid, wall clock and an in-process sequence number.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let sequence = TEMP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(
        ".{}.{}-{}-{}.tmp",
        name,
        std::process::id(),
        nanos,
        sequence
    ))
}

async fn write_synced(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    debug!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!("Failed to remove temporary file {}: {}", tmp.display(), e);
    }
}
