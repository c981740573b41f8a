use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::ResolverSettings;
use crate::maven::coordinates::Dependency;
use crate::maven::repository::Repository;
use crate::util::http_transport::{HttpTransport, Transport};

pub mod pom_loader;
pub mod report;
pub mod resolved;
pub mod single;
pub mod transitive;

pub use resolved::{Resolution, ResolvedDependency};

/// Rewrites each dependency before it is resolved, e.g. to force versions
pub type DependencyMapper<'a> = &'a (dyn Fn(&Dependency) -> Dependency + Send + Sync);

pub fn identity(dependency: &Dependency) -> Dependency {
    dependency.clone()
}

/// Resolves dependencies against Maven 2 repositories, downloading through a [Transport].
///
/// A resolver holds no per-run state and can be shared between concurrent resolutions; keeping it
///  alive reuses HTTP connections.
pub struct Resolver {
    transport: Arc<dyn Transport>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(settings: ResolverSettings) -> Resolver {
        Resolver {
            transport: Arc::new(HttpTransport::new(&settings)),
            settings,
        }
    }

    pub fn with_transport(settings: ResolverSettings, transport: Arc<dyn Transport>) -> Resolver {
        Resolver {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolves `dependencies` and everything they transitively depend on. The flag is `true` iff
    ///  every reached coordinate was resolved successfully.
    pub async fn resolve(&self, dependencies: &[Dependency], repositories: &[Arc<Repository>]) -> anyhow::Result<(Resolution, bool)> {
        self.resolve_mapped(dependencies, repositories, &identity).await
    }

    pub async fn resolve_mapped(&self, dependencies: &[Dependency], repositories: &[Arc<Repository>], mapper: DependencyMapper<'_>) -> anyhow::Result<(Resolution, bool)> {
        let mut resolution = Resolution::new();
        let complete = self.resolve_into(&mut resolution, dependencies, repositories, mapper).await?;
        Ok((resolution, complete))
    }

    /// Local paths of all artifacts `dependencies` need, or `None` if anything failed to resolve
    pub async fn resolve_dependency_artifacts(&self, dependencies: &[Dependency], repositories: &[Arc<Repository>]) -> anyhow::Result<Option<Vec<PathBuf>>> {
        let (resolution, complete) = self.resolve(dependencies, repositories).await?;
        if !complete {
            warn!("failed to resolve all artifacts:\n{}", resolution.failure_report());
            return Ok(None);
        }
        Ok(Some(resolution.artifacts()))
    }
}
