use std::sync::Arc;

use anyhow::anyhow;
use async_recursion::async_recursion;
use tracing::{debug, trace, warn};

use crate::maven::coordinates::*;
use crate::maven::paths::{pom_path, resolve_relative_path};
use crate::maven::pom::{is_management_import, Pom, RawPom};
use crate::maven::pom_xml::parse_pom;
use crate::maven::repository::Repository;
use crate::maven::retrieval::retrieve_file;
use crate::resolver::Resolver;

const MAX_PARENT_DEPTH: usize = 32;

impl Resolver {
    /// Parses and fully resolves a POM: parent chain, placeholders, dependency management imports.
    pub(crate) async fn load_pom(&self, data: &[u8], path: &str, repository: &Arc<Repository>, repositories: &[Arc<Repository>]) -> anyhow::Result<Pom> {
        let raw = self.load_raw_pom(data, path, repository, repositories).await?;
        Ok(self.resolve_pom(&raw, repository, repositories).await)
    }

    /// Parses a POM and links its parent. The parent is looked up via `relativePath` inside the same
    ///  repository first, then by coordinates. A parent that can not be found is reported but does
    ///  not fail the POM.
    pub(crate) async fn load_raw_pom(&self, data: &[u8], path: &str, repository: &Arc<Repository>, repositories: &[Arc<Repository>]) -> anyhow::Result<RawPom> {
        self.load_raw_pom_with_ancestors(data, path, repository, repositories, 0).await
    }

    #[async_recursion]
    async fn load_raw_pom_with_ancestors(&self, data: &[u8], path: &str, repository: &Arc<Repository>, repositories: &[Arc<Repository>], depth: usize) -> anyhow::Result<RawPom> {
        let raw = parse_pom(data, &format!("{} in {}", path, repository.name()))?;
        let Some(reference) = raw.parent_reference.clone() else {
            return Ok(raw);
        };
        if depth >= MAX_PARENT_DEPTH {
            warn!("{}: more than {} ancestors, probably a cycle - ignoring parent {}:{}:{}", raw.origin, MAX_PARENT_DEPTH, reference.group_id, reference.artifact_id, reference.version);
            return Ok(raw);
        }

        let mut parent = None;

        if let Some(parent_path) = reference.relative_path.as_deref().and_then(|r| resolve_relative_path(path, r)) {
            trace!("looking for the parent of {} at {}", raw.origin, parent_path);
            let snapshot = reference.version.ends_with("-SNAPSHOT");
            let retrieved = retrieve_file(&*self.transport, &parent_path, repository, snapshot).await;
            if let Some(parent_data) = retrieved.data {
                match self.load_raw_pom_with_ancestors(&parent_data, &parent_path, repository, repositories, depth + 1).await {
                    Ok(candidate) if candidate.is_referenced_by(&reference) => parent = Some(candidate),
                    Ok(_) => debug!("{} at the relative path of {} is not its parent", parent_path, raw.origin),
                    Err(e) => debug!("unusable parent candidate {} for {}: {:#}", parent_path, raw.origin, e),
                }
            }
        }

        let parent_id = DependencyId::new(&reference.group_id, &reference.artifact_id, &reference.version)
            .with_preferred_repository(repository.clone())
            .with_attribute(TYPE, "pom");

        if parent.is_none() {
            trace!("retrieving the parent of {} by coordinates {}", raw.origin, parent_id);
            let resolved = self.resolve_single_dependency(&parent_id, repositories).await;
            match (resolved.artifact_data().await, resolved.resolved_from.clone()) {
                (Some(parent_data), Some(from)) if !resolved.has_error => {
                    match self.load_raw_pom_with_ancestors(&parent_data, &pom_path(&resolved.id), &from, repositories, depth + 1).await {
                        Ok(p) => parent = Some(p),
                        Err(e) => warn!("parent {} of {} is unusable: {:#}", parent_id, raw.origin, e),
                    }
                }
                _ => debug!("parent {} of {} not resolved: {}", parent_id, raw.origin, resolved.log),
            }
        }

        match parent {
            Some(parent) => Ok(raw.with_parent(parent)),
            None => {
                warn!("{} declares parent {}, which was not found", raw.origin, parent_id);
                Ok(raw)
            }
        }
    }

    /// Resolves `raw` against its parent chain and inlines its dependency management imports
    ///  (recursively) before applying dependency management to its dependencies.
    pub(crate) async fn resolve_pom(&self, raw: &RawPom, repository: &Arc<Repository>, repositories: &[Arc<Repository>]) -> Pom {
        self.resolve_pom_importing(raw, repository, repositories, &[]).await
    }

    /// `importing` are the imports currently being inlined, outermost first
    #[async_recursion]
    async fn resolve_pom_importing(&self, raw: &RawPom, repository: &Arc<Repository>, repositories: &[Arc<Repository>], importing: &[DependencyId]) -> Pom {
        let pom = raw.resolve(repository, &self.settings.system_properties);

        let mut flat_management = Vec::with_capacity(pom.dependency_management.len());
        for managed in &pom.dependency_management {
            if !is_management_import(managed) {
                flat_management.push(managed.clone());
                continue;
            }
            if importing.contains(&managed.id) {
                warn!("{} imports {}, which is already being imported - skipping the circular import", raw.origin, managed.id);
                continue;
            }

            trace!("resolving dependency management import {} in {}", managed.id, raw.origin);
            match self.load_import(&managed.id, repositories, importing).await {
                Ok(imported) => {
                    trace!("{} imported {} managed dependencies from {}", raw.origin, imported.dependency_management.len(), managed.id);
                    flat_management.extend(imported.dependency_management);
                }
                Err(e) => warn!("dependency management import {} in {} failed: {:#}", managed.id, raw.origin, e),
            }
        }

        pom.resolve_effective_dependencies(flat_management)
    }

    async fn load_import(&self, id: &DependencyId, repositories: &[Arc<Repository>], importing: &[DependencyId]) -> anyhow::Result<Pom> {
        let resolved = self.resolve_single_dependency(id, repositories).await;
        if resolved.has_error {
            return Err(anyhow!("{}", resolved.log));
        }
        let from = resolved.resolved_from.clone()
            .ok_or_else(|| anyhow!("{} resolved without a repository", id))?;
        let data = resolved.artifact_data().await
            .ok_or_else(|| anyhow!("POM of {} has no content", id))?;

        let raw = self.load_raw_pom(&data, &pom_path(&resolved.id), &from, repositories).await?;
        let mut importing = importing.to_vec();
        importing.push(id.clone());
        Ok(self.resolve_pom_importing(&raw, &from, repositories, &importing).await)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::ResolverSettings;
    use crate::test_support::*;

    use super::*;

    fn resolver() -> Resolver {
        init_tracing();
        Resolver::with_transport(ResolverSettings::default(), Arc::new(InMemoryTransport::new()))
    }

    async fn load(resolver: &Resolver, local: &LocalRepositoryFixture, pom: &PomXml) -> Pom {
        let repository = local.arc();
        resolver.load_pom(pom.to_xml().as_bytes(), &pom.pom_path(), &repository, &[repository.clone()]).await.unwrap()
    }

    #[tokio::test]
    async fn test_parent_by_coordinates() {
        let local = LocalRepositoryFixture::new("local");
        let parent = PomXml::new("org.example", "parent", "7")
            .packaging("pom")
            .property("lib.version", "1.2")
            .managed_xml("<groupId>org.lib</groupId><artifactId>managed</artifactId><version>9</version>")
            .dependency("org.lib", "inherited", "1");
        local.publish(&parent);

        let child = PomXml::child_of(&parent, "child")
            .dependency("org.lib", "lib", "${lib.version}")
            .dependency_xml("<groupId>org.lib</groupId><artifactId>managed</artifactId>");

        let pom = load(&resolver(), &local, &child).await;

        assert_eq!(pom.group_id.as_deref(), Some("org.example"));
        assert_eq!(pom.version.as_deref(), Some("7"));
        let versions = pom.dependencies.iter()
            .map(|d| format!("{}:{}", d.id.name, d.id.version))
            .collect::<Vec<_>>();
        assert_eq!(versions, vec!["lib:1.2", "managed:9", "inherited:1"]);
    }

    #[tokio::test]
    async fn test_parent_by_relative_path() {
        let local = LocalRepositoryFixture::new("local");
        let parent = PomXml::new("org.example", "parent", "1").packaging("pom").property("x", "from-relative");
        local.put("org/example/parent/pom.xml", parent.to_xml().as_bytes());

        let child = PomXml::new("org.example", "child", "1")
            .parent_xml("<parent><groupId>org.example</groupId><artifactId>parent</artifactId><version>1</version><relativePath>../../parent</relativePath></parent>")
            .dependency("g", "a", "${x}");

        let pom = load(&resolver(), &local, &child).await;
        assert_eq!(pom.dependencies[0].id.version, "from-relative");
    }

    #[tokio::test]
    async fn test_relative_path_to_other_project_is_ignored() {
        let local = LocalRepositoryFixture::new("local");
        let impostor = PomXml::new("org.other", "impostor", "1").packaging("pom").property("x", "impostor");
        local.put("org/example/parent/pom.xml", impostor.to_xml().as_bytes());
        let parent = PomXml::new("org.example", "parent", "1").packaging("pom").property("x", "real");
        local.publish(&parent);

        let child = PomXml::new("org.example", "child", "1")
            .parent_xml("<parent><groupId>org.example</groupId><artifactId>parent</artifactId><version>1</version><relativePath>../../parent</relativePath></parent>")
            .dependency("g", "a", "${x}");

        let pom = load(&resolver(), &local, &child).await;
        assert_eq!(pom.dependencies[0].id.version, "real");
    }

    #[tokio::test]
    async fn test_missing_parent_is_tolerated() {
        let local = LocalRepositoryFixture::new("local");
        let parent = PomXml::new("org.example", "gone", "1");
        let child = PomXml::child_of(&parent, "child").dependency("g", "a", "1");

        let pom = load(&resolver(), &local, &child).await;
        assert_eq!(pom.dependencies.len(), 1);
        assert_eq!(pom.group_id.as_deref(), Some("org.example"));
    }

    #[tokio::test]
    async fn test_parent_cycle_terminates() {
        let local = LocalRepositoryFixture::new("local");
        let a = PomXml::new("org.example", "a", "1")
            .packaging("pom")
            .parent_xml("<parent><groupId>org.example</groupId><artifactId>b</artifactId><version>1</version></parent>");
        let b = PomXml::new("org.example", "b", "1")
            .packaging("pom")
            .parent_xml("<parent><groupId>org.example</groupId><artifactId>a</artifactId><version>1</version></parent>");
        local.publish(&a);
        local.publish(&b);

        let child = PomXml::child_of(&a, "child").dependency("g", "x", "1");
        let pom = load(&resolver(), &local, &child).await;
        assert_eq!(pom.dependencies.len(), 1);
    }

    #[tokio::test]
    async fn test_circular_management_import() {
        let local = LocalRepositoryFixture::new("local");
        local.publish(&PomXml::new("org.bom", "a", "1")
            .packaging("pom")
            .managed_xml("<groupId>org.lib</groupId><artifactId>from-a</artifactId><version>1</version>")
            .managed_xml("<groupId>org.bom</groupId><artifactId>b</artifactId><version>1</version><type>pom</type><scope>import</scope>"));
        local.publish(&PomXml::new("org.bom", "b", "1")
            .packaging("pom")
            .managed_xml("<groupId>org.lib</groupId><artifactId>from-b</artifactId><version>2</version>")
            .managed_xml("<groupId>org.bom</groupId><artifactId>a</artifactId><version>1</version><type>pom</type><scope>import</scope>"));

        let project = PomXml::new("org.example", "app", "1")
            .managed_xml("<groupId>org.bom</groupId><artifactId>a</artifactId><version>1</version><type>pom</type><scope>import</scope>");

        let pom = load(&resolver(), &local, &project).await;
        let managed = pom.dependency_management.iter()
            .map(|d| d.id.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(managed, vec!["from-a", "from-b"]);
    }

    #[tokio::test]
    async fn test_management_import() {
        let local = LocalRepositoryFixture::new("local");
        let nested_bom = PomXml::new("org.bom", "nested", "1")
            .packaging("pom")
            .managed_xml("<groupId>org.lib</groupId><artifactId>deep</artifactId><version>3</version>");
        let bom = PomXml::new("org.bom", "bom", "1")
            .packaging("pom")
            .managed_xml("<groupId>org.lib</groupId><artifactId>lib</artifactId><version>2</version><scope>runtime</scope>")
            .managed_xml("<groupId>org.bom</groupId><artifactId>nested</artifactId><version>1</version><type>pom</type><scope>import</scope>");
        local.publish(&nested_bom);
        local.publish(&bom);

        let project = PomXml::new("org.example", "app", "1")
            .managed_xml("<groupId>org.bom</groupId><artifactId>bom</artifactId><version>1</version><type>pom</type><scope>import</scope>")
            .managed_xml("<groupId>org.bom</groupId><artifactId>missing</artifactId><version>1</version><type>pom</type><scope>import</scope>")
            .dependency_xml("<groupId>org.lib</groupId><artifactId>lib</artifactId>")
            .dependency_xml("<groupId>org.lib</groupId><artifactId>deep</artifactId>");

        let pom = load(&resolver(), &local, &project).await;

        let lib = &pom.dependencies[0];
        assert_eq!(lib.id.version, "2");
        assert_eq!(lib.id.scope(), "runtime");
        assert_eq!(pom.dependencies[1].id.version, "3");
        assert!(pom.dependency_management.iter().all(|d| !is_management_import(d)));
        assert_eq!(pom.dependency_management.len(), 2);
    }
}
