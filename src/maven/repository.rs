use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use lazy_static::lazy_static;
use tracing::warn;
use url::Url;

use crate::config::default_local_repository;
use crate::util::checksum::Checksum;

pub const DEFAULT_SNAPSHOT_UPDATE_DELAY: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_CACHE_NAME: &str = "local";

lazy_static! {
    static ref DEFAULT_CACHE: Arc<Repository> = Arc::new(local_m2());
}

/// A Maven 2 layout repository, either on the local file system (`file:` URL) or remote.
///
/// A remote repository always has a local repository as its cache; downloaded files are stored
///  there and looked up there first. A local repository never has a cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    name: String,
    url: Url, // with trailing '/'
    cache: Option<Arc<Repository>>,
    releases: bool,
    snapshots: bool,
    checksum: Checksum,
    tolerate_checksum_mismatch: bool,
    snapshot_update_delay: Duration,
}

impl Repository {
    /// Remote repositories are cached in the default local repository unless configured otherwise
    ///  via [Repository::with_cache].
    pub fn new(name: impl Into<String>, url: Url) -> Repository {
        let mut url = url;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let mut result = Repository {
            name: name.into(),
            url,
            cache: None,
            releases: true,
            snapshots: true,
            checksum: Checksum::default(),
            tolerate_checksum_mismatch: false,
            snapshot_update_delay: DEFAULT_SNAPSHOT_UPDATE_DELAY,
        };
        if !result.is_local() {
            result.cache = Some(DEFAULT_CACHE.clone());
        }
        result
    }

    pub fn local(name: impl Into<String>, directory: &Path) -> anyhow::Result<Repository> {
        let url = Url::from_directory_path(directory)
            .map_err(|_| anyhow!("not an absolute directory path: {}", directory.display()))?;
        Ok(Repository::new(name, url))
    }

    /// A local repository silently keeps having no cache, a remote repository falls back to the
    ///  default cache if `cache` is `None` or not local.
    pub fn with_cache(mut self, cache: Option<Arc<Repository>>) -> Repository {
        self.cache = match cache {
            Some(cache) if self.is_local() => {
                warn!("local repository {} can not have a cache - ignoring {}", self.name, cache.name);
                None
            }
            None if self.is_local() => None,
            Some(cache) if cache.is_local() => Some(cache),
            Some(cache) => {
                warn!("cache {} of repository {} is not local - using the default cache instead", cache.name, self.name);
                Some(DEFAULT_CACHE.clone())
            }
            None => {
                warn!("remote repository {} needs a cache - using the default cache", self.name);
                Some(DEFAULT_CACHE.clone())
            }
        };
        self
    }

    pub fn with_releases(mut self, releases: bool) -> Repository {
        self.releases = releases;
        self
    }

    pub fn with_snapshots(mut self, snapshots: bool) -> Repository {
        self.snapshots = snapshots;
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Repository {
        self.checksum = checksum;
        self
    }

    pub fn tolerating_checksum_mismatch(mut self, tolerate: bool) -> Repository {
        self.tolerate_checksum_mismatch = tolerate;
        self
    }

    pub fn with_snapshot_update_delay(mut self, delay: Duration) -> Repository {
        self.snapshot_update_delay = delay;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn cache(&self) -> Option<&Arc<Repository>> {
        self.cache.as_ref()
    }

    pub fn releases(&self) -> bool {
        self.releases
    }

    pub fn snapshots(&self) -> bool {
        self.snapshots
    }

    pub fn checksum(&self) -> Checksum {
        self.checksum
    }

    pub fn tolerates_checksum_mismatch(&self) -> bool {
        self.tolerate_checksum_mismatch
    }

    pub fn snapshot_update_delay(&self) -> Duration {
        self.snapshot_update_delay
    }

    pub fn is_local(&self) -> bool {
        self.url.scheme() == "file"
    }

    /// root directory of a local repository
    pub fn local_path(&self) -> Option<PathBuf> {
        if !self.is_local() {
            return None;
        }
        self.url.to_file_path().ok()
    }

    /// The directory resolution writes to when using this repository: a local repository's own
    ///  directory, a remote repository's cache directory.
    pub fn directory_to_lock(&self) -> Option<PathBuf> {
        match &self.cache {
            Some(cache) => cache.local_path(),
            None => self.local_path(),
        }
    }

    /// `path` is relative to the repository root, e.g. `org/example/lib/1.0/lib-1.0.pom`
    pub fn file_url(&self, path: &str) -> anyhow::Result<Url> {
        Ok(self.url.join(path)?)
    }
}

impl Display for Repository {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.name, self.url)?;
        if let Some(cache) = &self.cache {
            write!(f, " (cached by {})", cache.name)?;
        }
        Ok(())
    }
}

pub fn maven_central() -> Repository {
    Repository::new(
        "central",
        Url::parse("https://repo1.maven.org/maven2/").expect("valid literal URL"),
    )
        .with_snapshots(false)
}

/// The default local repository, see [crate::config::default_local_repository]
pub fn local_m2() -> Repository {
    let path = default_local_repository();
    Repository::local(DEFAULT_CACHE_NAME, &path)
        .expect("default local repository is absolute")
}

/// The order in which repositories are searched: every cache is added next to the repository it
///  caches, local repositories come before remote ones, ties are broken by name. Repositories with a
///  name that is already present are dropped.
pub fn sort_for_resolution(repositories: &[Arc<Repository>]) -> Vec<Arc<Repository>> {
    let mut result: Vec<Arc<Repository>> = Vec::with_capacity(repositories.len() * 2);
    for repository in repositories {
        result.push(repository.clone());
        if let Some(cache) = &repository.cache {
            result.push(cache.clone());
        }
    }

    result.sort_by(|a, b| (!a.is_local(), &a.name).cmp(&(!b.is_local(), &b.name)));

    let mut seen = HashSet::new();
    result.retain(|r| seen.insert(r.name.clone()));
    result
}
