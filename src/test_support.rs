//! Fixtures shared by the unit tests: an in-memory [Transport] and builders for Maven repository
//!  layouts on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use url::Url;

use crate::maven::repository::Repository;
use crate::util::checksum::Checksum;
use crate::util::http_transport::Transport;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Serves files from a map keyed by URL and records every request
#[derive(Default)]
pub struct InMemoryTransport {
    files: Mutex<HashMap<String, Bytes>>,
    requests: Mutex<Vec<String>>,
}

impl InMemoryTransport {
    pub fn new() -> InMemoryTransport {
        Default::default()
    }

    pub fn put(&self, repository: &Repository, path: &str, data: &[u8]) {
        let url = repository.file_url(path).unwrap();
        self.files.lock().unwrap().insert(url.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn put_with_checksum(&self, repository: &Repository, path: &str, data: &[u8], checksum: Checksum) {
        self.put(repository, path, data);
        if let (Some(suffix), Some(digest)) = (checksum.suffix(), checksum.digest(data)) {
            self.put(repository, &format!("{}{}", path, suffix), hex::encode(digest).as_bytes());
        }
    }

    /// POM (and jar, unless the packaging is `pom`) with SHA1 checksum files
    pub fn publish(&self, repository: &Repository, pom: &PomXml) {
        self.put_with_checksum(repository, &pom.pom_path(), pom.to_xml().as_bytes(), Checksum::Sha1);
        if let Some(jar_path) = pom.jar_path() {
            self.put_with_checksum(repository, &jar_path, pom.jar_content().as_bytes(), Checksum::Sha1);
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn get(&self, url: &Url) -> anyhow::Result<Option<Bytes>> {
        self.requests.lock().unwrap().push(url.to_string());
        Ok(self.files.lock().unwrap().get(url.as_str()).cloned())
    }
}

/// A local repository in a temp directory
pub struct LocalRepositoryFixture {
    dir: TempDir,
    name: String,
}

impl LocalRepositoryFixture {
    pub fn new(name: &str) -> LocalRepositoryFixture {
        LocalRepositoryFixture {
            dir: tempfile::tempdir().unwrap(),
            name: name.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, path: &str) -> PathBuf {
        self.dir.path().join(path)
    }

    pub fn put(&self, path: &str, data: &[u8]) {
        let file = self.path(path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, data).unwrap();
    }

    pub fn publish(&self, pom: &PomXml) {
        self.put(&pom.pom_path(), pom.to_xml().as_bytes());
        if let Some(jar_path) = pom.jar_path() {
            self.put(&jar_path, pom.jar_content().as_bytes());
        }
    }

    pub fn repository(&self) -> Repository {
        Repository::local(&self.name, self.dir.path()).unwrap()
    }

    pub fn arc(&self) -> Arc<Repository> {
        Arc::new(self.repository())
    }
}

/// A remote repository at `https://<name>.example/maven2/`, cached in `cache`
pub fn remote_repository(name: &str, cache: &LocalRepositoryFixture) -> Repository {
    Repository::new(name, Url::parse(&format!("https://{}.example/maven2/", name)).unwrap())
        .with_cache(Some(cache.arc()))
}

/// Builds POM documents for test repositories
#[derive(Clone, Debug)]
pub struct PomXml {
    group: Option<String>,
    artifact: String,
    version: Option<String>,
    packaging: Option<String>,
    parent: Option<String>,
    properties: Vec<(String, String)>,
    dependencies: Vec<String>,
    managed: Vec<String>,
}

impl PomXml {
    pub fn new(group: &str, artifact: &str, version: &str) -> PomXml {
        PomXml {
            group: Some(group.to_string()),
            artifact: artifact.to_string(),
            version: Some(version.to_string()),
            packaging: None,
            parent: None,
            properties: vec![],
            dependencies: vec![],
            managed: vec![],
        }
    }

    /// groupId and version are inherited from the parent
    pub fn child_of(parent: &PomXml, artifact: &str) -> PomXml {
        PomXml {
            group: None,
            version: None,
            parent: Some(format!(
                "<parent><groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version></parent>",
                parent.group(), parent.artifact, parent.version(),
            )),
            ..PomXml::new("", artifact, "")
        }
    }

    pub fn packaging(mut self, packaging: &str) -> PomXml {
        self.packaging = Some(packaging.to_string());
        self
    }

    pub fn parent_xml(mut self, xml: &str) -> PomXml {
        self.parent = Some(xml.to_string());
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> PomXml {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }

    pub fn dependency(self, group: &str, artifact: &str, version: &str) -> PomXml {
        self.dependency_xml(&format!(
            "<groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version>", group, artifact, version,
        ))
    }

    pub fn scoped_dependency(self, group: &str, artifact: &str, version: &str, scope: &str) -> PomXml {
        self.dependency_xml(&format!(
            "<groupId>{}</groupId><artifactId>{}</artifactId><version>{}</version><scope>{}</scope>", group, artifact, version, scope,
        ))
    }

    /// content of a `<dependency>` element
    pub fn dependency_xml(mut self, xml: &str) -> PomXml {
        self.dependencies.push(xml.to_string());
        self
    }

    /// content of a `<dependency>` element in `<dependencyManagement>`
    pub fn managed_xml(mut self, xml: &str) -> PomXml {
        self.managed.push(xml.to_string());
        self
    }

    fn group(&self) -> String {
        self.group.clone().unwrap_or_default()
    }

    fn version(&self) -> String {
        self.version.clone().unwrap_or_default()
    }

    /// only valid for POMs that declare groupId and version themselves, or via [PomXml::child_of]
    pub fn effective_coordinates(&self) -> (String, String, String) {
        let inherited = |tag: &str| -> String {
            let parent = self.parent.as_deref().unwrap_or("");
            let open = format!("<{}>", tag);
            let close = format!("</{}>", tag);
            match (parent.find(&open), parent.find(&close)) {
                (Some(start), Some(end)) => parent[start + open.len()..end].to_string(),
                _ => String::new(),
            }
        };
        (
            self.group.clone().unwrap_or_else(|| inherited("groupId")),
            self.artifact.clone(),
            self.version.clone().unwrap_or_else(|| inherited("version")),
        )
    }

    pub fn pom_path(&self) -> String {
        let (group, artifact, version) = self.effective_coordinates();
        format!("{}/{}/{}/{}-{}.pom", group.replace('.', "/"), artifact, version, artifact, version)
    }

    pub fn jar_path(&self) -> Option<String> {
        if self.packaging.as_deref() == Some("pom") {
            return None;
        }
        let (group, artifact, version) = self.effective_coordinates();
        Some(format!("{}/{}/{}/{}-{}.jar", group.replace('.', "/"), artifact, version, artifact, version))
    }

    pub fn jar_content(&self) -> String {
        let (_, artifact, version) = self.effective_coordinates();
        format!("{}-{}.jar", artifact, version)
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<project xmlns=\"http://maven.apache.org/POM/4.0.0\">\n  <modelVersion>4.0.0</modelVersion>\n");
        if let Some(parent) = &self.parent {
            xml.push_str(&format!("  {}\n", parent));
        }
        if let Some(group) = &self.group {
            xml.push_str(&format!("  <groupId>{}</groupId>\n", group));
        }
        xml.push_str(&format!("  <artifactId>{}</artifactId>\n", self.artifact));
        if let Some(version) = &self.version {
            xml.push_str(&format!("  <version>{}</version>\n", version));
        }
        if let Some(packaging) = &self.packaging {
            xml.push_str(&format!("  <packaging>{}</packaging>\n", packaging));
        }
        if !self.properties.is_empty() {
            xml.push_str("  <properties>\n");
            for (key, value) in &self.properties {
                xml.push_str(&format!("    <{}>{}</{}>\n", key, value, key));
            }
            xml.push_str("  </properties>\n");
        }
        if !self.managed.is_empty() {
            xml.push_str("  <dependencyManagement><dependencies>\n");
            for managed in &self.managed {
                xml.push_str(&format!("    <dependency>{}</dependency>\n", managed));
            }
            xml.push_str("  </dependencies></dependencyManagement>\n");
        }
        if !self.dependencies.is_empty() {
            xml.push_str("  <dependencies>\n");
            for dependency in &self.dependencies {
                xml.push_str(&format!("    <dependency>{}</dependency>\n", dependency));
            }
            xml.push_str("  </dependencies>\n");
        }
        xml.push_str("</project>\n");
        xml
    }
}
