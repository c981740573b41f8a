use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{anyhow, bail};
use bytes::Bytes;
use tokio::fs::{create_dir_all, remove_file, rename};
use tracing::{error, trace, warn};
use uuid::Uuid;

use crate::util::checksum::Checksum;

/// `<file><suffix>`, e.g. `lib-1.0.jar.sha1`
pub fn sidecar_path(file: &Path, suffix: &str) -> PathBuf {
    let mut result = OsString::from(file.as_os_str());
    result.push(suffix);
    PathBuf::from(result)
}

/// Reads a file from a local repository, checking it against its checksum file if there is one.
///
/// `Ok(None)` if the file does not exist. A checksum mismatch is an error unless `tolerate_mismatch`
///  is set, a missing checksum file is not.
pub async fn read_verified(file: &Path, checksum: Checksum, tolerate_mismatch: bool) -> anyhow::Result<Option<Bytes>> {
    let data = match tokio::fs::read(file).await {
        Ok(data) => Bytes::from(data),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) if file.is_dir() => {
            warn!("{} is a directory, not a file: {}", file.display(), e);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let Some(suffix) = checksum.suffix() else {
        return Ok(Some(data));
    };
    let checksum_file = match tokio::fs::read_to_string(sidecar_path(file, suffix)).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            trace!("no {} checksum file for {}", checksum, file.display());
            return Ok(Some(data));
        }
        Err(e) => return Err(e.into()),
    };

    match checksum.verify(&data, &checksum_file) {
        v if v.is_acceptable() => Ok(Some(data)),
        v if tolerate_mismatch => {
            warn!("{}: {} - using it anyway", file.display(), v);
            Ok(Some(data))
        }
        v => Err(anyhow!("{}", v)),
    }
}

/// `true` if `file` was written less than `max_age` ago
pub async fn is_fresh(file: &Path, max_age: Duration) -> bool {
    let modified = match tokio::fs::metadata(file).await.and_then(|m| m.modified()) {
        Ok(modified) => modified,
        Err(_) => return false,
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < max_age,
        Err(_) => true, // modified in the future
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// an existing file with the same length was kept
    Reused,
    /// an existing file with a different length was kept, the new data was not stored
    Refused,
}

/// Stores downloaded data in a cache directory.
///
/// An existing file is only replaced if `overwrite` is set (used for snapshots); otherwise it is
///  kept, and a length mismatch is reported as [StoreOutcome::Refused]. Data is written to a temp
///  file next to the target and renamed, so readers never see partial files. If `checksum` names
///  an algorithm, a checksum file is written next to the stored file.
pub async fn store(file: &Path, data: &[u8], checksum: Checksum, overwrite: bool) -> anyhow::Result<StoreOutcome> {
    match tokio::fs::metadata(file).await {
        Ok(meta) if meta.is_dir() => bail!("{} is a directory", file.display()),
        Ok(meta) if !overwrite => {
            if meta.len() == data.len() as u64 {
                trace!("{} is already cached", file.display());
                return Ok(StoreOutcome::Reused);
            }
            warn!("{} already exists with a different length ({} vs {} bytes) - not overwriting it", file.display(), meta.len(), data.len());
            return Ok(StoreOutcome::Refused);
        }
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    write_atomically(file, data).await?;

    if let Some(suffix) = checksum.suffix() {
        if let Some(digest) = checksum.digest(data) {
            let content = Checksum::format_checksum_file(&digest);
            write_atomically(&sidecar_path(file, suffix), content.as_bytes()).await?;
        }
    }
    Ok(StoreOutcome::Written)
}

async fn write_atomically(file: &Path, data: &[u8]) -> anyhow::Result<()> {
    let parent = file.parent()
        .ok_or_else(|| anyhow!("{} has no parent directory", file.display()))?;
    let file_name = file.file_name()
        .ok_or_else(|| anyhow!("{} has no file name", file.display()))?;
    create_dir_all(parent).await?;

    let mut temp_name = OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(format!(".{}.inserting", Uuid::new_v4().as_hyphenated()));
    let temp_path = parent.join(temp_name);

    trace!("writing {} via {}", file.display(), temp_path.display());

    let result = match tokio::fs::write(&temp_path, data).await {
        Ok(()) => rename(&temp_path, file).await,
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        error!("error writing {}: {}", file.display(), e);
        if let Err(e) = remove_file(&temp_path).await {
            if e.kind() != ErrorKind::NotFound {
                error!("error cleaning up temp file {}: {}", temp_path.display(), e);
            }
        }
        return Err(e.into());
    }
    Ok(())
}
