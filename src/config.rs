use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::maven::repository::{Repository, DEFAULT_CACHE_NAME};

pub const DEFAULT_USER_AGENT: &str = concat!("maven-resolve/", env!("CARGO_PKG_VERSION"));

pub const ENV_USER_AGENT: &str = "MAVEN_RESOLVE_USER_AGENT";
pub const ENV_RETRIES: &str = "MAVEN_RESOLVE_RETRIES";
pub const ENV_TIMEOUT_SECS: &str = "MAVEN_RESOLVE_TIMEOUT_SECS";
pub const ENV_LOCAL_REPOSITORY: &str = "M2_REPOSITORY";

/// Knobs of a [crate::resolver::Resolver] that are not part of the dependency graph itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    /// Maven Central rejects requests without a user agent
    pub user_agent: String,
    /// additional attempts after a failed transfer (not after a 404)
    pub request_retries: u32,
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    /// directory of the default local repository, which is also the default cache of remote
    ///  repositories
    pub local_repository: PathBuf,
    /// consulted for `${...}` placeholders in POMs when no property of that name is declared
    pub system_properties: BTreeMap<String, String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_retries: 2,
            retry_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
            local_repository: default_local_repository(),
            system_properties: BTreeMap::new(),
        }
    }
}

impl ResolverSettings {
    pub fn from_env() -> anyhow::Result<ResolverSettings> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json(json: &str) -> anyhow::Result<ResolverSettings> {
        Ok(serde_json::from_str(json)?)
    }

    /// The local repository at `local_repository`
    pub fn local_m2_repository(&self) -> anyhow::Result<Repository> {
        Repository::local(DEFAULT_CACHE_NAME, &self.local_repository)
    }

    /// A remote repository that is cached in [ResolverSettings::local_m2_repository]
    pub fn cached_remote_repository(&self, name: &str, url: Url) -> anyhow::Result<Repository> {
        Ok(Repository::new(name, url).with_cache(Some(Arc::new(self.local_m2_repository()?))))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<ResolverSettings> {
        let mut result = ResolverSettings::default();

        if let Some(user_agent) = lookup(ENV_USER_AGENT) {
            result.user_agent = user_agent;
        }
        if let Some(retries) = lookup(ENV_RETRIES) {
            result.request_retries = retries.trim().parse()
                .map_err(|e| anyhow!("{} is not a valid number of retries: {:?} ({})", ENV_RETRIES, retries, e))?;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = timeout.trim().parse()
                .map_err(|e| anyhow!("{} is not a valid number of seconds: {:?} ({})", ENV_TIMEOUT_SECS, timeout, e))?;
            result.request_timeout = Duration::from_secs(secs);
        }
        if let Some(local_repository) = lookup(ENV_LOCAL_REPOSITORY).filter(|s| !s.is_empty()) {
            result.local_repository = absolute(PathBuf::from(local_repository));
        }

        debug!("resolver settings: {:?}", result);
        Ok(result)
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        return path;
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => std::env::temp_dir().join(path),
    }
}

/// `$M2_REPOSITORY` if set, `~/.m2/repository` otherwise. Always absolute.
pub fn default_local_repository() -> PathBuf {
    if let Some(path) = std::env::var_os(ENV_LOCAL_REPOSITORY).filter(|s| !s.is_empty()) {
        return absolute(PathBuf::from(path));
    }
    match dirs::home_dir() {
        Some(home) => absolute(home.join(".m2").join("repository")),
        None => std::env::temp_dir().join(".m2").join("repository"),
    }
}
