use anyhow::{anyhow, bail};
use tracing::{debug, trace};
use xml::reader::{EventReader, XmlEvent};

use crate::maven::pom::*;

/// Parses a POM document into a [RawPom] without parent link.
///
/// Only the parts relevant for dependency resolution are read; anything else (build, profiles,
///  reporting, ...) is skipped. `<repositories>` are ignored, resolution only uses the repositories
///  it was configured with.
pub fn parse_pom(data: &[u8], origin: &str) -> anyhow::Result<RawPom> {
    let mut builder = PomBuilder::new(origin);

    for event in EventReader::new(data) {
        match event.map_err(|e| anyhow!("malformed XML in {}: {}", origin, e))? {
            XmlEvent::StartElement { name, .. } => builder.start_element(name.local_name)?,
            XmlEvent::EndElement { .. } => builder.end_element()?,
            XmlEvent::Characters(text) | XmlEvent::CData(text) => builder.text.push_str(&text),
            _ => {}
        }
    }
    builder.finish()
}

/// Collects a [RawPom] from the events of a streaming parser, keyed by the path of element names
///  from the document root. Dependencies, exclusions and the parent reference are assembled in a
///  pending slot that is opened on their start element and committed on its end element.
struct PomBuilder {
    pom: RawPom,
    path: Vec<String>,
    text: String,
    model_version: Option<String>,
    seen_root: bool,
    parent: Option<ParentReference>,
    dependency: Option<RawPomDependency>,
    exclusion: Option<RawPomExclusion>,
}

impl PomBuilder {
    fn new(origin: &str) -> PomBuilder {
        PomBuilder {
            pom: RawPom {
                origin: origin.to_string(),
                ..Default::default()
            },
            path: Vec::new(),
            text: String::new(),
            model_version: None,
            seen_root: false,
            parent: None,
            dependency: None,
            exclusion: None,
        }
    }

    fn start_element(&mut self, name: String) -> anyhow::Result<()> {
        if self.path.is_empty() {
            if self.seen_root || name != "project" {
                bail!("{} is not a POM: root element is <{}>", self.pom.origin, name);
            }
            self.seen_root = true;
        }

        self.path.push(name);
        self.text.clear();

        let path = self.path.iter().map(String::as_str).collect::<Vec<_>>();
        match path.as_slice() {
            ["project", "parent"] => self.parent = Some(ParentReference::default()),
            ["project", "dependencies", "dependency"]
            | ["project", "dependencyManagement", "dependencies", "dependency"] => self.dependency = Some(RawPomDependency::default()),
            ["project", .., "dependency", "exclusions", "exclusion"] => self.exclusion = Some(RawPomExclusion::default()),
            _ => {}
        }
        Ok(())
    }

    fn end_element(&mut self) -> anyhow::Result<()> {
        let text = std::mem::take(&mut self.text).trim().to_string();
        let origin = self.pom.origin.as_str();
        let path = self.path.iter().map(String::as_str).collect::<Vec<_>>();

        match path.as_slice() {
            ["project", "modelVersion"] => self.model_version = Some(text),
            ["project", "groupId"] => self.pom.group_id = Some(text),
            ["project", "artifactId"] => self.pom.artifact_id = Some(text),
            ["project", "version"] => self.pom.version = Some(text),
            ["project", "packaging"] => self.pom.packaging = Some(text),

            ["project", "parent", field] => {
                if let Some(parent) = &mut self.parent {
                    match *field {
                        "groupId" => parent.group_id = text,
                        "artifactId" => parent.artifact_id = text,
                        "version" => parent.version = text,
                        "relativePath" => parent.relative_path = Some(text),
                        _ => {}
                    }
                }
            }
            ["project", "parent"] => {
                let parent = self.parent.take().unwrap_or_default();
                if parent.group_id.is_empty() || parent.artifact_id.is_empty() || parent.version.is_empty() {
                    bail!("{}: incomplete <parent> declaration {:?}", origin, parent);
                }
                self.pom.parent_reference = Some(parent);
            }

            ["project", "properties", key] => {
                self.pom.properties.insert(key.to_string(), text);
            }

            ["project", .., "dependency", "exclusions", "exclusion", field] => {
                if let Some(exclusion) = &mut self.exclusion {
                    match *field {
                        "groupId" => exclusion.group_id = Some(text),
                        "artifactId" => exclusion.artifact_id = Some(text),
                        _ => {}
                    }
                }
            }
            ["project", .., "dependency", "exclusions", "exclusion"] => {
                if let (Some(dependency), Some(exclusion)) = (&mut self.dependency, self.exclusion.take()) {
                    dependency.exclusions.push(exclusion);
                }
            }

            ["project", "dependencies", "dependency", field]
            | ["project", "dependencyManagement", "dependencies", "dependency", field] => {
                if let Some(dependency) = &mut self.dependency {
                    match *field {
                        "groupId" => dependency.group_id = Some(text),
                        "artifactId" => dependency.artifact_id = Some(text),
                        "version" => dependency.version = Some(text),
                        "classifier" => dependency.classifier = Some(text),
                        "type" => dependency.dependency_type = Some(text),
                        "scope" => dependency.scope = Some(text),
                        "optional" => dependency.optional = Some(text),
                        _ => {}
                    }
                }
            }
            ["project", "dependencies", "dependency"] => {
                if let Some(dependency) = self.dependency.take() {
                    self.pom.dependencies.push(dependency);
                }
            }
            ["project", "dependencyManagement", "dependencies", "dependency"] => {
                if let Some(dependency) = self.dependency.take() {
                    self.pom.dependency_management.push(dependency);
                }
            }

            ["project", "repositories", "repository"] => {
                debug!("{} declares a repository - ignoring it, only configured repositories are used", origin);
            }
            _ => {}
        }

        self.path.pop();
        Ok(())
    }

    fn finish(self) -> anyhow::Result<RawPom> {
        if !self.seen_root {
            bail!("{} is not a POM: no root element", self.pom.origin);
        }
        match self.model_version.as_deref() {
            Some(SUPPORTED_MODEL_VERSION) | None => {}
            Some(other) => bail!("{}: unsupported modelVersion {:?}, expected {}", self.pom.origin, other, SUPPORTED_MODEL_VERSION),
        }
        trace!("parsed {}: {} dependencies, {} managed dependencies", self.pom.origin, self.pom.dependencies.len(), self.pom.dependency_management.len());
        Ok(self.pom)
    }
}
