use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::maven::local_cache::{self, StoreOutcome};
use crate::maven::repository::Repository;
use crate::util::checksum::ChecksumVerification;
use crate::util::http_transport::Transport;

/// Result of looking up a single file in a repository.
///
/// `data` is present iff the file was found (and passed verification). `local_path` is present if
///  the file is also available on the local file system, i.e. it came from a local repository or
///  was stored in a cache. `failure` says why `data` is absent.
#[derive(Debug, Default)]
pub struct RetrievedFile {
    pub data: Option<Bytes>,
    pub local_path: Option<PathBuf>,
    pub failure: Option<String>,
}
impl RetrievedFile {
    fn found(data: Bytes, local_path: Option<PathBuf>) -> RetrievedFile {
        RetrievedFile {
            data: Some(data),
            local_path,
            failure: None,
        }
    }

    fn failed(reason: impl Into<String>) -> RetrievedFile {
        RetrievedFile {
            data: None,
            local_path: None,
            failure: Some(reason.into()),
        }
    }

    pub fn is_found(&self) -> bool {
        self.data.is_some()
    }

    pub fn failure_reason(&self) -> &str {
        self.failure.as_deref().unwrap_or("not found")
    }
}

/// Looks up `path` (relative to the repository root) in `repository`.
///
/// Local repositories are read directly. Remote repositories are looked up in their cache first;
///  for `snapshot` files, a cached copy is only used while it is younger than the repository's
///  snapshot update delay. Downloaded files are verified against the repository's checksum files
///  and stored in the cache.
pub async fn retrieve_file(transport: &dyn Transport, path: &str, repository: &Repository, snapshot: bool) -> RetrievedFile {
    retrieve_file_cached_as(transport, path, path, repository, snapshot).await
}

/// Like [retrieve_file], but stores a downloaded file under `cache_path` instead of `path`
pub async fn retrieve_file_cached_as(transport: &dyn Transport, path: &str, cache_path: &str, repository: &Repository, snapshot: bool) -> RetrievedFile {
    if let Some(root) = repository.local_path() {
        return read_local(&root.join(path), repository).await;
    }

    let Some(cache) = repository.cache() else {
        return RetrievedFile::failed("remote repository without cache");
    };
    let Some(cache_root) = cache.local_path() else {
        return RetrievedFile::failed(format!("cache {} is not a local repository", cache.name()));
    };
    let cache_file = cache_root.join(cache_path);

    let fresh = !snapshot || local_cache::is_fresh(&cache_file, repository.snapshot_update_delay()).await;
    let mut rejected = false;
    let cached = match local_cache::read_verified(&cache_file, cache.checksum(), cache.tolerates_checksum_mismatch()).await {
        Ok(cached) => cached,
        Err(e) => {
            warn!("cached {} is unusable, retrieving it again: {:#}", cache_file.display(), e);
            rejected = true;
            None
        }
    };

    match cached {
        Some(data) if fresh => {
            trace!("{} found in cache {}", path, cache.name());
            RetrievedFile::found(data, Some(cache_file))
        }
        Some(stale) => {
            debug!("cached {} is older than {:?}, checking {} for an update", cache_file.display(), repository.snapshot_update_delay(), repository.name());
            let downloaded = download(transport, path, &cache_file, repository, true).await;
            if downloaded.is_found() {
                return downloaded;
            }
            warn!("{}: update of {} failed ({}) - using the cached copy", repository.name(), path, downloaded.failure_reason());
            RetrievedFile::found(stale, Some(cache_file))
        }
        // a rejected copy must not be kept as the stored artifact
        None => download(transport, path, &cache_file, repository, snapshot || rejected).await,
    }
}

async fn read_local(file: &Path, repository: &Repository) -> RetrievedFile {
    match local_cache::read_verified(file, repository.checksum(), repository.tolerates_checksum_mismatch()).await {
        Ok(Some(data)) => {
            trace!("found {} in {}", file.display(), repository.name());
            RetrievedFile::found(data, Some(file.to_path_buf()))
        }
        Ok(None) => RetrievedFile::failed("not found"),
        Err(e) => {
            warn!("{}: can not use {}: {:#}", repository.name(), file.display(), e);
            RetrievedFile::failed(format!("{:#}", e))
        }
    }
}

async fn download(transport: &dyn Transport, path: &str, cache_file: &Path, repository: &Repository, overwrite: bool) -> RetrievedFile {
    let url = match repository.file_url(path) {
        Ok(url) => url,
        Err(e) => return RetrievedFile::failed(format!("invalid path {}: {}", path, e)),
    };

    info!("downloading {}", url);
    let data = match transport.get(&url).await {
        Ok(Some(data)) => data,
        Ok(None) => {
            debug!("{} not found in {}", path, repository.name());
            return RetrievedFile::failed("not found");
        }
        Err(e) => {
            warn!("{}: download of {} failed: {:#}", repository.name(), url, e);
            return RetrievedFile::failed(format!("download failed: {}", e));
        }
    };

    if let Err(reason) = verify_download(transport, repository, &url, &data).await {
        return RetrievedFile::failed(reason);
    }

    let local_path = match repository.cache() {
        Some(cache) => match local_cache::store(cache_file, &data, cache.checksum(), overwrite).await {
            Ok(StoreOutcome::Written) | Ok(StoreOutcome::Reused) => Some(cache_file.to_path_buf()),
            Ok(StoreOutcome::Refused) => None,
            Err(e) => {
                warn!("{}: failed to store {} in cache {}: {:#}", repository.name(), path, cache.name(), e);
                None
            }
        },
        None => None,
    };
    RetrievedFile::found(data, local_path)
}

/// A missing checksum file is tolerated, a malformed or mismatching one is not (unless the
///  repository is configured to tolerate mismatches).
async fn verify_download(transport: &dyn Transport, repository: &Repository, url: &Url, data: &[u8]) -> Result<(), String> {
    let checksum = repository.checksum();
    let Some(suffix) = checksum.suffix() else {
        trace!("{} does not verify checksums", repository.name());
        return Ok(());
    };

    let checksum_url = match Url::parse(&format!("{}{}", url, suffix)) {
        Ok(u) => u,
        Err(e) => return Err(format!("invalid checksum URL for {}: {}", url, e)),
    };
    let checksum_file = match transport.get(&checksum_url).await {
        Ok(Some(content)) => content,
        Ok(None) => {
            warn!("{}: no {} checksum for {} - can't verify its integrity", repository.name(), checksum, url);
            return Ok(());
        }
        Err(e) => {
            warn!("{}: failed to retrieve {} checksum for {} - can't verify its integrity: {:#}", repository.name(), checksum, url, e);
            return Ok(());
        }
    };

    match checksum.verify(data, &String::from_utf8_lossy(&checksum_file)) {
        ChecksumVerification::Valid | ChecksumVerification::NotChecked => Ok(()),
        problem if repository.tolerates_checksum_mismatch() => {
            warn!("{}: {} for {} - continuing because the repository tolerates checksum mismatches", repository.name(), problem, url);
            Ok(())
        }
        problem => {
            warn!("{}: {} for {}", repository.name(), problem, url);
            Err(problem.to_string())
        }
    }
}
