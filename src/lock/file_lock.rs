//! File-backed cross-process lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, trace};

use super::{CrossProcessLock, HeldResource, LockError, LockToken};
use crate::constants::defaults;

/// Advisory exclusive lock on a well-known file.
///
/// Each attempt opens a fresh handle and tries a non-blocking exclusive lock,
/// so two attempts inside one process contend exactly like two processes do.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileLock {
    /// Creates the lock file if it does not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        open_lock_file(&path).map_err(|e| LockError::FileCreation {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        Ok(Self {
            path,
            poll_interval: Duration::from_millis(defaults::LOCK_FILE_POLL_INTERVAL_MS),
        })
    }

    /// Lock file `~lock.tmp` in the system temp directory.
    pub fn in_temp_dir() -> Result<Self, LockError> {
        Self::new(std::env::temp_dir().join(defaults::LOCK_FILE_NAME))
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn attempt(&self) -> Result<Option<File>, LockError> {
        let file = open_lock_file(&self.path).map_err(|e| LockError::Io {
            resource: self.resource(),
            error: e.to_string(),
        })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(LockError::Io {
                resource: self.resource(),
                error: e.to_string(),
            }),
        }
    }
}

#[async_trait]
impl CrossProcessLock for FileLock {
    async fn try_acquire(&self, timeout: Duration) -> Result<LockToken, LockError> {
        let started = Instant::now();

        loop {
            if let Some(file) = self.attempt()? {
                debug!(resource = %self.resource(), "Lock acquired");
                return Ok(LockToken::new(self.resource(), HeldResource::File(file)));
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(LockError::Timeout {
                    resource: self.resource(),
                    waited_ms: elapsed.as_millis(),
                });
            }

            trace!(resource = %self.resource(), "Lock held elsewhere, retrying");
            tokio::time::sleep(self.poll_interval.min(timeout - elapsed)).await;
        }
    }

    fn resource(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_in(dir: &tempfile::TempDir) -> FileLock {
        FileLock::new(dir.path().join("~lock.tmp"))
            .unwrap()
            .with_poll_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_new_creates_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_in(&dir);
        assert!(lock.path().exists());
    }

    #[test]
    fn test_new_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileLock::new(dir.path().join("missing").join("~lock.tmp"));
        assert!(matches!(result, Err(LockError::FileCreation { .. })));
    }

    #[tokio::test]
    async fn test_second_holder_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_in(&dir);

        let token = lock.try_acquire(Duration::from_millis(100)).await.unwrap();
        let second = lock.try_acquire(Duration::from_millis(100)).await;
        assert!(matches!(second, Err(LockError::Timeout { .. })));

        token.release();
        let third = lock.try_acquire(Duration::from_millis(100)).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_two_lock_instances_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = lock_in(&dir);
        let second = lock_in(&dir);

        let token = first.try_acquire(Duration::from_millis(100)).await.unwrap();
        assert!(second
            .try_acquire(Duration::from_millis(60))
            .await
            .unwrap_err()
            .is_timeout());
        drop(token);

        assert!(second.try_acquire(Duration::from_millis(100)).await.is_ok());
    }

    #[tokio::test]
    async fn test_waiter_acquires_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let lock = lock_in(&dir);
        let token = lock.try_acquire(Duration::from_millis(100)).await.unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.try_acquire(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.release();

        let acquired = waiter.await.unwrap();
        assert!(acquired.is_ok());
    }
}
