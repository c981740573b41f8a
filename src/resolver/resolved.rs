use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexMap;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::maven::coordinates::{Dependency, DependencyId};
use crate::maven::repository::Repository;

/// Outcome of resolving a single coordinate (not its transitive dependencies).
///
/// `has_error` resolutions keep the human readable reason in `log`. A successful resolution of a
///  `jar` has an `artifact` on the local file system; a `pom` typed one may also have it, while a
///  POM-packaged module without explicit type has none.
#[derive(Debug)]
pub struct ResolvedDependency {
    pub id: DependencyId,
    /// direct dependencies as declared by the POM, dependency management applied
    pub dependencies: Vec<Dependency>,
    pub resolved_from: Option<Arc<Repository>>,
    pub has_error: bool,
    pub log: String,
    pub artifact: Option<PathBuf>,
    artifact_data: OnceCell<Option<Bytes>>,
}

impl ResolvedDependency {
    pub fn new(
        id: DependencyId,
        dependencies: Vec<Dependency>,
        resolved_from: Option<Arc<Repository>>,
        has_error: bool,
        log: impl Into<String>,
        artifact: Option<PathBuf>,
        artifact_data: Option<Bytes>,
    ) -> ResolvedDependency {
        ResolvedDependency {
            id,
            dependencies,
            resolved_from,
            has_error,
            log: log.into(),
            artifact,
            artifact_data: match artifact_data {
                Some(data) => OnceCell::new_with(Some(Some(data))),
                None => OnceCell::new(),
            },
        }
    }

    pub fn failure(id: DependencyId, log: impl Into<String>, resolved_from: Option<Arc<Repository>>) -> ResolvedDependency {
        ResolvedDependency::new(id, vec![], resolved_from, true, log, None, None)
    }

    pub fn artifact(&self) -> Option<&Path> {
        self.artifact.as_deref()
    }

    /// The artifact's content, read from `artifact` on first access unless it was retained during
    ///  resolution.
    pub async fn artifact_data(&self) -> Option<Bytes> {
        self.artifact_data
            .get_or_init(|| async {
                let Some(path) = self.artifact.as_ref() else {
                    return None;
                };
                match tokio::fs::read(path).await {
                    Ok(data) => Some(Bytes::from(data)),
                    Err(e) => {
                        warn!("failed to read artifact {} of {}: {}", path.display(), self.id, e);
                        None
                    }
                }
            })
            .await
            .clone()
    }
}

/// Everything a resolution run resolved, keyed by coordinate in the order of first resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    resolved: IndexMap<DependencyId, ResolvedDependency>,
}

impl Resolution {
    pub fn new() -> Resolution {
        Default::default()
    }

    pub fn get(&self, id: &DependencyId) -> Option<&ResolvedDependency> {
        self.resolved.get(id)
    }

    pub fn contains(&self, id: &DependencyId) -> bool {
        self.resolved.contains_key(id)
    }

    /// Replaces an existing entry for an equal coordinate, keeping its position.
    pub fn insert(&mut self, resolved: ResolvedDependency) {
        self.resolved.insert(resolved.id.clone(), resolved);
    }

    /// Stores `resolved` under the coordinate that was asked for, which differs from `resolved.id`
    ///  when a unique snapshot build was picked.
    pub(crate) fn insert_requested(&mut self, requested: DependencyId, resolved: ResolvedDependency) {
        self.resolved.insert(requested, resolved);
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item=&ResolvedDependency> {
        self.resolved.values()
    }

    pub fn is_complete(&self) -> bool {
        self.iter().all(|r| !r.has_error)
    }

    /// Local paths of all resolved artifacts, in resolution order
    pub fn artifacts(&self) -> Vec<PathBuf> {
        self.iter()
            .filter_map(|r| r.artifact.clone())
            .collect()
    }

    pub fn failures(&self) -> Vec<&ResolvedDependency> {
        self.iter()
            .filter(|r| r.has_error)
            .collect()
    }
}

impl IntoIterator for Resolution {
    type Item = ResolvedDependency;
    type IntoIter = indexmap::map::IntoValues<DependencyId, ResolvedDependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.resolved.into_values()
    }
}
