use std::sync::Arc;
use std::time::Instant;

use async_recursion::async_recursion;
use tracing::{debug, info, trace, warn};

use crate::maven::coordinates::*;
use crate::maven::metadata_xml::Metadata;
use crate::maven::paths::{artifact_path, maven_metadata_path, pom_path};
use crate::maven::repository::{sort_for_resolution, Repository};
use crate::maven::retrieval::{retrieve_file, retrieve_file_cached_as, RetrievedFile};
use crate::resolver::{ResolvedDependency, Resolver};

impl Resolver {
    /// Resolves `id` alone, without its transitive dependencies.
    ///
    /// The id's preferred repository is tried first (preceded by its cache), then every repository
    ///  of `repositories` in resolution order. The first success wins.
    #[async_recursion]
    pub async fn resolve_single_dependency(&self, id: &DependencyId, repositories: &[Arc<Repository>]) -> ResolvedDependency {
        let start = Instant::now();
        debug!("resolving {}", id);

        let preferred = id.preferred_repository.clone();
        let preferred_cache = preferred.as_ref().and_then(|r| r.cache().cloned());
        let is_preferred = |r: &Arc<Repository>| {
            preferred.iter().chain(preferred_cache.iter()).any(|p| p.name() == r.name())
        };

        let candidates = preferred_cache.iter()
            .chain(preferred.iter())
            .cloned()
            .chain(sort_for_resolution(repositories).into_iter().filter(|r| !is_preferred(r)))
            .collect::<Vec<_>>();

        let mut tried = Vec::with_capacity(candidates.len());
        for repository in candidates {
            debug!("trying {} in {}", id, repository);
            let resolved = self.resolve_in_repository(id, &repository, repositories).await;
            if !resolved.has_error {
                debug!("resolved {} from {} ({} ms)", resolved.id, repository.name(), start.elapsed().as_millis());
                return resolved;
            }
            tried.push(format!("{}: {}", repository.name(), resolved.log));
        }

        debug!("failed to resolve {} ({} ms)", id, start.elapsed().as_millis());
        let log = if tried.is_empty() {
            "no repositories to search in".to_string()
        }
        else {
            format!("tried {}", tried.join("; "))
        };
        ResolvedDependency::failure(id.clone(), log, None)
    }

    /// Resolves `id` in `repository` only; `repositories` are used for parent POMs and
    ///  dependency management imports.
    pub async fn resolve_in_repository(&self, id: &DependencyId, repository: &Arc<Repository>, repositories: &[Arc<Repository>]) -> ResolvedDependency {
        let snapshot = id.is_snapshot();
        if snapshot && !repository.snapshots() {
            return ResolvedDependency::failure(id.clone(), "release-only repository skipped for snapshot dependency", Some(repository.clone()));
        }
        if !snapshot && !repository.releases() {
            return ResolvedDependency::failure(id.clone(), "snapshot-only repository skipped for release dependency", Some(repository.clone()));
        }

        let (pom_file, id) = match self.retrieve_pom(id, repository).await {
            Ok(result) => result,
            Err(reason) => return ResolvedDependency::failure(id.clone(), reason, Some(repository.clone())),
        };
        let Some(pom_data) = pom_file.data else {
            return ResolvedDependency::failure(id, "POM not found", Some(repository.clone()));
        };

        if id.explicit_attribute(&TYPE).map(|t| t.eq_ignore_ascii_case("pom")).unwrap_or(false) {
            return ResolvedDependency::new(id, vec![], Some(repository.clone()), false, "", pom_file.local_path, Some(pom_data));
        }

        let pom = match self.load_pom(&pom_data, &pom_path(&id), repository, repositories).await {
            Ok(pom) => pom,
            Err(e) => {
                debug!("failed to load the POM of {} from {}: {:#}", id, repository.name(), e);
                return ResolvedDependency::failure(id, format!("malformed POM: {:#}", e), Some(repository.clone()));
            }
        };

        let packaging = id.explicit_attribute(&TYPE)
            .unwrap_or(&pom.packaging)
            .to_ascii_lowercase();
        match packaging.as_str() {
            "pom" => ResolvedDependency::new(id, pom.dependencies, Some(repository.clone()), false, "", None, None),
            "jar" | "bundle" => {
                let jar_path = artifact_path(&id, "jar");
                let jar = retrieve_file(&*self.transport, &jar_path, repository, snapshot).await;
                match jar.local_path {
                    // the jar's content is not retained, it is read lazily if at all
                    Some(path) => ResolvedDependency::new(id, pom.dependencies, Some(repository.clone()), false, "", Some(path), None),
                    None if jar.data.is_some() => {
                        warn!("{}: {} was retrieved but could not be stored locally", repository.name(), jar_path);
                        ResolvedDependency::new(id, pom.dependencies, Some(repository.clone()), true, "jar could not be stored locally", None, None)
                    }
                    None => {
                        warn!("{}: failed to retrieve {}: {}", repository.name(), jar_path, jar.failure_reason());
                        ResolvedDependency::new(id, pom.dependencies, Some(repository.clone()), true, format!("failed to retrieve jar: {}", jar.failure_reason()), None, None)
                    }
                }
            }
            other => {
                warn!("unsupported packaging {:?} of {}", other, id);
                ResolvedDependency::new(id, pom.dependencies, Some(repository.clone()), true, format!("unsupported dependency type \"{}\"", other), None, None)
            }
        }
    }

    /// Retrieves the POM of `id`. For a snapshot not found under its plain name, the newest unique
    ///  snapshot build is looked up in `maven-metadata.xml`; the returned id then carries it as
    ///  [SNAPSHOT_VERSION].
    async fn retrieve_pom(&self, id: &DependencyId, repository: &Arc<Repository>) -> Result<(RetrievedFile, DependencyId), String> {
        let snapshot = id.is_snapshot();
        let path = pom_path(id);
        trace!("retrieving {} from {}", path, repository.name());

        let retrieved = retrieve_file(&*self.transport, &path, repository, snapshot).await;
        if retrieved.is_found() {
            return Ok((retrieved, id.clone()));
        }
        if !snapshot || id.explicit_attribute(&SNAPSHOT_VERSION).is_some() {
            return Err(format!("POM {}", retrieved.failure_reason()));
        }

        let metadata_path = maven_metadata_path(id, None);
        let metadata_cache_path = maven_metadata_path(id, Some(repository));
        let metadata = retrieve_file_cached_as(&*self.transport, &metadata_path, &metadata_cache_path, repository, true).await;
        let Some(metadata) = metadata.data else {
            return Err(format!("POM {}, snapshot metadata {}", retrieved.failure_reason(), metadata.failure_reason()));
        };

        let snapshot_version = Metadata::parse(&metadata)
            .and_then(|m| m.unique_snapshot_version(&id.version))
            .map_err(|e| format!("failed to resolve snapshot metadata: {:#}", e))?;

        info!("resolving {} in {} with snapshot version {}", id, repository.name(), snapshot_version);
        let id = id.clone().with_attribute(SNAPSHOT_VERSION, snapshot_version);
        let retrieved = retrieve_file(&*self.transport, &pom_path(&id), repository, snapshot).await;
        if retrieved.is_found() {
            Ok((retrieved, id))
        }
        else {
            Err(format!("POM of snapshot version {} {}", id.explicit_attribute(&SNAPSHOT_VERSION).unwrap_or(""), retrieved.failure_reason()))
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::ResolverSettings;
    use crate::test_support::*;

    use super::*;

    fn resolver(transport: &Arc<InMemoryTransport>) -> Resolver {
        init_tracing();
        Resolver::with_transport(ResolverSettings::default(), transport.clone())
    }

    #[tokio::test]
    async fn test_resolves_jar_from_local_repository() {
        let local = LocalRepositoryFixture::new("local");
        local.publish(&PomXml::new("org.example", "lib", "1.0").dependency("org.example", "other", "2.0"));
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("org.example", "lib", "1.0"), &[local.arc()]).await;

        assert!(!resolved.has_error, "{}", resolved.log);
        assert_eq!(resolved.artifact(), Some(local.path("org/example/lib/1.0/lib-1.0.jar").as_path()));
        assert_eq!(resolved.resolved_from.as_ref().map(|r| r.name()), Some("local"));
        assert_eq!(resolved.dependencies.len(), 1);
        assert_eq!(resolved.dependencies[0].id, DependencyId::new("org.example", "other", "2.0"));
        assert_eq!(resolved.dependencies[0].id.preferred_repository.as_ref().map(|r| r.name()), Some("local"));
    }

    #[tokio::test]
    async fn test_pom_type_returns_pom_itself() {
        let local = LocalRepositoryFixture::new("local");
        local.publish(&PomXml::new("org.example", "lib", "1.0").dependency("org.example", "other", "2.0"));
        let transport = Arc::new(InMemoryTransport::new());

        let id = DependencyId::new("org.example", "lib", "1.0").with_attribute(TYPE, "pom");
        let resolved = resolver(&transport).resolve_single_dependency(&id, &[local.arc()]).await;

        assert!(!resolved.has_error);
        assert!(resolved.dependencies.is_empty());
        assert_eq!(resolved.artifact(), Some(local.path("org/example/lib/1.0/lib-1.0.pom").as_path()));
        assert!(resolved.artifact_data().await.unwrap().starts_with(b"<?xml"));
    }

    #[tokio::test]
    async fn test_pom_packaging_has_no_artifact() {
        let local = LocalRepositoryFixture::new("local");
        local.publish(&PomXml::new("org.example", "aggregate", "1.0").packaging("pom").dependency("org.example", "lib", "1.0"));
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("org.example", "aggregate", "1.0"), &[local.arc()]).await;

        assert!(!resolved.has_error);
        assert!(resolved.artifact().is_none());
        assert_eq!(resolved.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_packaging() {
        let local = LocalRepositoryFixture::new("local");
        local.publish(&PomXml::new("org.example", "plugin", "1.0").packaging("maven-plugin"));
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("org.example", "plugin", "1.0"), &[local.arc()]).await;

        assert!(resolved.has_error);
        assert!(resolved.log.contains("unsupported dependency type \"maven-plugin\""), "{}", resolved.log);
    }

    #[tokio::test]
    async fn test_missing_jar() {
        let local = LocalRepositoryFixture::new("local");
        local.put("org/example/lib/1.0/lib-1.0.pom", PomXml::new("org.example", "lib", "1.0").to_xml().as_bytes());
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("org.example", "lib", "1.0"), &[local.arc()]).await;

        assert!(resolved.has_error);
        assert!(resolved.log.contains("failed to retrieve jar"), "{}", resolved.log);
    }

    #[tokio::test]
    async fn test_failure_lists_tried_repositories() {
        let first = LocalRepositoryFixture::new("first");
        let second = LocalRepositoryFixture::new("second");
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("g", "missing", "1"), &[second.arc(), first.arc()]).await;

        assert!(resolved.has_error);
        assert!(resolved.resolved_from.is_none());
        assert_eq!(resolved.log, "tried first: POM not found; second: POM not found");
    }

    #[tokio::test]
    async fn test_no_repositories() {
        let transport = Arc::new(InMemoryTransport::new());
        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("g", "a", "1"), &[]).await;

        assert!(resolved.has_error);
        assert_eq!(resolved.log, "no repositories to search in");
    }

    #[tokio::test]
    async fn test_preferred_repository_is_tried_first() {
        let a = LocalRepositoryFixture::new("a");
        let b = LocalRepositoryFixture::new("b");
        a.publish(&PomXml::new("g", "x", "1"));
        b.publish(&PomXml::new("g", "x", "1"));
        let transport = Arc::new(InMemoryTransport::new());

        let id = DependencyId::new("g", "x", "1").with_preferred_repository(b.arc());
        let resolved = resolver(&transport).resolve_single_dependency(&id, &[a.arc(), b.arc()]).await;

        assert_eq!(resolved.resolved_from.as_ref().map(|r| r.name()), Some("b"));
    }

    #[tokio::test]
    async fn test_release_and_snapshot_policies() {
        let cache = LocalRepositoryFixture::new("cache");
        let releases = Arc::new(remote_repository("releases", &cache).with_snapshots(false));
        let snapshots = Arc::new(remote_repository("snapshots", &cache).with_releases(false));
        let transport = Arc::new(InMemoryTransport::new());
        let resolver = resolver(&transport);

        let snapshot = resolver.resolve_in_repository(&DependencyId::new("g", "a", "1-SNAPSHOT"), &releases, &[]).await;
        assert!(snapshot.has_error);
        assert_eq!(snapshot.log, "release-only repository skipped for snapshot dependency");

        let release = resolver.resolve_in_repository(&DependencyId::new("g", "a", "1"), &snapshots, &[]).await;
        assert!(release.has_error);
        assert_eq!(release.log, "snapshot-only repository skipped for release dependency");
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_unique_snapshot() {
        let cache = LocalRepositoryFixture::new("cache");
        let remote = Arc::new(remote_repository("snapshots", &cache));
        let transport = Arc::new(InMemoryTransport::new());
        transport.put(&remote, "g/lib/1.0-SNAPSHOT/maven-metadata.xml", br#"<metadata>
            <versioning><snapshot><timestamp>20180424.190328</timestamp><buildNumber>2</buildNumber></snapshot></versioning>
        </metadata>"#);
        transport.put(&remote, "g/lib/1.0-SNAPSHOT/lib-1.0-20180424.190328-2.pom", PomXml::new("g", "lib", "1.0-SNAPSHOT").to_xml().as_bytes());
        transport.put(&remote, "g/lib/1.0-SNAPSHOT/lib-1.0-20180424.190328-2.jar", b"snapshot jar");

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("g", "lib", "1.0-SNAPSHOT"), &[remote.clone()]).await;

        assert!(!resolved.has_error, "{}", resolved.log);
        assert_eq!(resolved.id.explicit_attribute(&SNAPSHOT_VERSION), Some("20180424.190328-2"));
        assert_eq!(resolved.artifact(), Some(cache.path("g/lib/1.0-SNAPSHOT/lib-1.0-20180424.190328-2.jar").as_path()));
        assert!(cache.path("g/lib/1.0-SNAPSHOT/maven-metadata-snapshots.xml").is_file());
    }

    #[tokio::test]
    async fn test_malformed_pom() {
        let local = LocalRepositoryFixture::new("local");
        local.put("g/a/1/a-1.pom", b"<project><modelVersion>4.0.0");
        let transport = Arc::new(InMemoryTransport::new());

        let resolved = resolver(&transport).resolve_single_dependency(&DependencyId::new("g", "a", "1"), &[local.arc()]).await;

        assert!(resolved.has_error);
        assert!(resolved.log.contains("malformed POM"), "{}", resolved.log);
    }
}
