use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, error, info, trace};

pub const LOCK_FILE_NAME: &str = ".maven-resolve.lock";

/// Exclusive cross-process lock on a directory, held until dropped.
///
/// The lock is an advisory lock on a marker file inside the directory. It is scoped to the
///  canonical directory path, so different spellings of the same directory share a lock.
#[derive(Debug)]
pub struct DirectoryLock {
    file: File,
    directory: PathBuf,
}

impl DirectoryLock {
    /// Blocks the calling thread while another process holds the lock; `on_wait` is called once
    ///  before blocking.
    pub fn acquire_blocking(directory: &Path, on_wait: impl FnOnce(&Path)) -> anyhow::Result<DirectoryLock> {
        std::fs::create_dir_all(directory)?;
        let directory = std::fs::canonicalize(directory)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(directory.join(LOCK_FILE_NAME))?;

        trace!("checking lock for {}", directory.display());
        if let Err(e) = file.try_lock_exclusive() {
            trace!("try lock failed, waiting for exclusive lock: {:?}", e);
            on_wait(&directory);
            file.lock_exclusive()
                .map_err(|e| anyhow::anyhow!("could not acquire lock on {}: {}", directory.display(), e))?;
        }
        debug!("acquired lock on {}", directory.display());

        Ok(DirectoryLock {
            file,
            directory,
        })
    }

    pub async fn acquire(directory: PathBuf) -> anyhow::Result<DirectoryLock> {
        tokio::task::spawn_blocking(move || {
            DirectoryLock::acquire_blocking(&directory, |d| info!("waiting for lock on {}", d.display()))
        })
            .await?
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}

impl Drop for DirectoryLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            error!("failed to unlock {} - other processes may be stuck: {}", self.directory.display(), e);
        }
        else {
            debug!("released lock on {}", self.directory.display());
        }
    }
}

/// Locks all `directories` in a fixed (sorted) order, so that two processes locking overlapping
///  sets can not deadlock. Duplicates are locked once.
pub async fn lock_all(directories: impl IntoIterator<Item=PathBuf>) -> anyhow::Result<Vec<DirectoryLock>> {
    let mut directories = directories.into_iter().collect::<Vec<_>>();
    directories.sort();
    directories.dedup();

    let mut result = Vec::with_capacity(directories.len());
    for directory in directories {
        result.push(DirectoryLock::acquire(directory).await?);
    }
    Ok(result)
}
