//! Per-instance scratch directory for decrypt-to-disk operations.
//!
//! Every instance owns `<base>/<id>/` and holds an exclusive lock on
//! `<base>/<id>.lock` for its lifetime. A purge only reclaims directories whose
//! lock can be taken, so live siblings are never touched.

use crate::error::{StorageError, StorageErrorExt};
use fs2::FileExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, error, info, warn};

/// Loose files directly under the base older than this are leftovers.
const STALE_AFTER: Duration = Duration::from_secs(300);

const LOCK_EXTENSION: &str = "lock";

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// A uniquely named directory under a shared base, owned by one storage instance.
///
/// Created by [`StagingArea::init`] and removed by [`StagingArea::shutdown`]; the host
/// application decides when both happen.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    instance: String,
    counter: AtomicU64,
    lock_path: PathBuf,
    // Held, not read: the OS lock lives as long as this handle.
    _lock: std::fs::File,
}

impl StagingArea {
    /// Creates `<base>/<instance-id>/` after purging leftovers of instances that
    /// are gone.
    ///
    /// # Errors
    /// Returns [`StorageError::Io`] if the directories or the lock cannot be created.
    pub async fn init(base: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let base = base.into();
        fs::create_dir_all(&base)
            .await
            .context(format!("Failed to create staging base: {}", base.display()))?;

        purge_stale(&base).await;

        let instance = nanoid::nanoid!(12, &ID_ALPHABET);
        let lock_path = base.join(format!("{instance}.{LOCK_EXTENSION}"));
        let lock = claim(&lock_path)
            .context(format!("Failed to lock staging area: {}", lock_path.display()))?;

        let dir = base.join(&instance);
        fs::create_dir(&dir)
            .await
            .context(format!("Failed to create staging directory: {}", dir.display()))?;

        info!(path = %dir.display(), "Staging area ready");
        Ok(Self { dir, instance, counter: AtomicU64::new(1), lock_path, _lock: lock })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// A path inside the staging directory that no other caller will receive.
    #[must_use]
    pub fn next_path(&self) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        self.dir.join(format!("{}-{n}.stage", self.instance))
    }

    /// Recursively removes the staging directory and its lock file.
    /// Failures are logged, not returned.
    pub async fn shutdown(&self) {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(path = %self.dir.display(), "Staging area removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.dir.display(), error = %e, "Failed to remove staging area"),
        }
        match fs::remove_file(&self.lock_path).await {
            Ok(()) => {},
            Err(e) if e.kind() == io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.lock_path.display(), error = %e, "Failed to remove staging lock"),
        }
    }
}

fn claim(lock_path: &Path) -> io::Result<std::fs::File> {
    let lock = std::fs::OpenOptions::new().read(true).write(true).create_new(true).open(lock_path)?;
    lock.try_lock_exclusive()?;
    Ok(lock)
}

async fn purge_stale(base: &Path) {
    let base = base.to_path_buf();
    let now = SystemTime::now();

    match tokio::task::spawn_blocking(move || remove_stale(&base, now, STALE_AFTER)).await {
        Ok((removed, failed)) if removed > 0 || failed > 0 => {
            info!(removed, failed, "Purged stale staging files");
        },
        Err(e) => error!(error = %e, "Staging cleanup task panicked"),
        _ => {},
    }
}

/// Reclaims abandoned instance directories and old loose files under `base`.
///
/// Directories are judged by their lock only, never by age.
fn remove_stale(base: &Path, now: SystemTime, threshold: Duration) -> (usize, usize) {
    let mut removed = 0;
    let mut failed = 0;

    let entries = match std::fs::read_dir(base) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %base.display(), error = %e, "Failed to scan staging base");
            return (0, 1);
        },
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let outcome = if path.extension().is_some_and(|ext| ext == LOCK_EXTENSION) {
            release_abandoned(&path)
        } else if entry.file_type().is_ok_and(|t| t.is_file()) && is_stale(&path, now, threshold) {
            std::fs::remove_file(&path).map(|()| true)
        } else {
            Ok(false)
        };

        match outcome {
            Ok(true) => removed += 1,
            Ok(false) => {},
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to remove stale staging entry");
                failed += 1;
            },
        }
    }

    (removed, failed)
}

/// Removes the directory behind `lock_path` if no instance holds the lock.
fn release_abandoned(lock_path: &Path) -> io::Result<bool> {
    let lock = match std::fs::OpenOptions::new().read(true).write(true).open(lock_path) {
        Ok(lock) => lock,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    if lock.try_lock_exclusive().is_err() {
        return Ok(false);
    }

    match std::fs::remove_dir_all(lock_path.with_extension("")) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => return Err(e),
    }
    std::fs::remove_file(lock_path)?;
    Ok(true)
}

fn is_stale(path: &Path, now: SystemTime, threshold: Duration) -> bool {
    std::fs::symlink_metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn paths_are_unique_and_inside() {
        let temp = TempDir::new().unwrap();
        let staging = StagingArea::init(temp.path()).await.unwrap();

        let a = staging.next_path();
        let b = staging.next_path();
        assert_ne!(a, b);
        assert!(a.starts_with(staging.dir()));
        assert!(staging.dir().is_dir());
    }

    #[tokio::test]
    async fn instances_do_not_share_directories() {
        let temp = TempDir::new().unwrap();
        let first = StagingArea::init(temp.path()).await.unwrap();
        let second = StagingArea::init(temp.path()).await.unwrap();

        assert_ne!(first.dir(), second.dir());
        assert!(first.dir().is_dir(), "fresh sibling must survive the purge");
    }

    #[tokio::test]
    async fn shutdown_removes_everything() {
        let temp = TempDir::new().unwrap();
        let staging = StagingArea::init(temp.path()).await.unwrap();
        std::fs::write(staging.next_path(), b"scratch").unwrap();

        staging.shutdown().await;
        assert!(!staging.dir().exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
        staging.shutdown().await;
    }

    #[tokio::test]
    async fn live_siblings_survive_a_late_purge() {
        let temp = TempDir::new().unwrap();
        let live = StagingArea::init(temp.path()).await.unwrap();
        let kept = live.next_path();
        std::fs::write(&kept, b"held for a long time").unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(remove_stale(temp.path(), later, STALE_AFTER), (0, 0));

        assert!(kept.is_file());
        std::fs::write(live.next_path(), b"still writable").unwrap();
    }

    #[tokio::test]
    async fn abandoned_instances_are_reclaimed() {
        let temp = TempDir::new().unwrap();
        let crashed = temp.path().join("crashed");
        std::fs::create_dir(&crashed).unwrap();
        std::fs::write(crashed.join("crashed-1.stage"), b"x").unwrap();
        std::fs::write(temp.path().join("crashed.lock"), b"").unwrap();

        let fresh = StagingArea::init(temp.path()).await.unwrap();
        assert!(!crashed.exists());
        assert!(!temp.path().join("crashed.lock").exists());
        assert!(fresh.dir().is_dir());
    }

    #[tokio::test]
    async fn unowned_directories_are_left_alone() {
        let temp = TempDir::new().unwrap();
        let foreign = temp.path().join("foreign");
        std::fs::create_dir(&foreign).unwrap();

        let later = SystemTime::now() + Duration::from_secs(3600);
        assert_eq!(remove_stale(temp.path(), later, STALE_AFTER), (0, 0));
        assert!(foreign.is_dir());
    }

    #[test]
    fn only_old_entries_are_stale() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("leftover.stage");
        std::fs::write(&file, b"x").unwrap();

        let now = SystemTime::now();
        assert!(!is_stale(&file, now, STALE_AFTER));
        assert!(is_stale(&file, now + Duration::from_secs(301), STALE_AFTER));

        let (removed, failed) = remove_stale(temp.path(), now + Duration::from_secs(301), STALE_AFTER);
        assert_eq!((removed, failed), (1, 0));
        assert!(!file.exists());
    }
}
