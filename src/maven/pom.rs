use std::collections::BTreeMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::{debug, trace, warn};

use crate::maven::coordinates::*;
use crate::maven::repository::Repository;

pub const SUPPORTED_MODEL_VERSION: &str = "4.0.0";
const DEFAULT_PACKAGING: &str = "jar";
const MAX_SUBSTITUTION_DEPTH: usize = 8;

lazy_static! {
    static ref PLACEHOLDER_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// A `<dependency>` element as written in a POM, placeholders not substituted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPomDependency {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub classifier: Option<String>,
    pub dependency_type: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
    pub exclusions: Vec<RawPomExclusion>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPomExclusion {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentReference {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub relative_path: Option<String>,
}

/// The literal content of a single POM document, linked to its parent (if that was found).
///
/// Values may contain `${...}` placeholders; [RawPom::resolve] substitutes them.
#[derive(Debug, Clone, Default)]
pub struct RawPom {
    /// where the document came from, for diagnostics
    pub origin: String,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub dependencies: Vec<RawPomDependency>,
    pub dependency_management: Vec<RawPomDependency>,
    pub parent_reference: Option<ParentReference>,
    pub parent: Option<Arc<RawPom>>,
}

impl RawPom {
    pub fn with_parent(mut self, parent: RawPom) -> RawPom {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// this POM first, then its ancestors
    pub fn chain(&self) -> impl Iterator<Item=&RawPom> {
        std::iter::successors(Some(self), |pom| pom.parent.as_deref())
    }

    fn inherited<'a>(&'a self, getter: impl Fn(&'a RawPom) -> Option<&'a String>) -> Option<&'a String> {
        self.chain().find_map(getter)
    }

    /// groupId of this POM, or of the nearest ancestor declaring one
    pub fn inherited_group_id(&self) -> Option<&String> {
        self.inherited(|p| p.group_id.as_ref())
            .or_else(|| self.parent_reference.as_ref().map(|r| &r.group_id))
    }

    pub fn inherited_version(&self) -> Option<&String> {
        self.inherited(|p| p.version.as_ref())
            .or_else(|| self.parent_reference.as_ref().map(|r| &r.version))
    }

    /// `true` if this document is the one `reference` points to
    pub fn is_referenced_by(&self, reference: &ParentReference) -> bool {
        self.artifact_id.as_deref() == Some(reference.artifact_id.as_str())
            && self.inherited_group_id().map(String::as_str) == Some(reference.group_id.as_str())
    }

    /// Walks the parent chain, substituting placeholders in every dependency and dependency
    ///  management entry. Every produced dependency prefers `repository`.
    pub fn resolve(&self, repository: &Arc<Repository>, system_properties: &BTreeMap<String, String>) -> Pom {
        let translator = Translator {
            pom: self,
            system_properties,
        };

        let mut dependencies = Vec::new();
        let mut dependency_management = Vec::new();
        for (i, pom) in self.chain().enumerate() {
            if i > 0 {
                let packaging = pom.packaging.as_deref().map(|p| translator.translate(p));
                if !packaging.as_deref().unwrap_or(DEFAULT_PACKAGING).eq_ignore_ascii_case("pom") {
                    warn!("parent {} of {} has packaging {:?} (expected 'pom')", pom.origin, self.origin, packaging.as_deref().unwrap_or(DEFAULT_PACKAGING));
                }
            }
            dependencies.extend(pom.dependencies.iter().map(|d| translator.dependency(d, repository)));
            dependency_management.extend(pom.dependency_management.iter().map(|d| translator.dependency(d, repository)));
        }

        Pom {
            group_id: self.inherited_group_id().map(|s| translator.translate(s)),
            artifact_id: self.artifact_id.as_deref().map(|s| translator.translate(s)),
            version: self.inherited_version().map(|s| translator.translate(s)),
            packaging: self.packaging.as_deref()
                .map(|s| translator.translate(s))
                .unwrap_or_else(|| DEFAULT_PACKAGING.to_string()),
            dependencies,
            dependency_management,
        }
    }
}

/// Substitutes `${...}` placeholders in the context of a POM
struct Translator<'a> {
    pom: &'a RawPom,
    system_properties: &'a BTreeMap<String, String>,
}

impl Translator<'_> {
    fn translate(&self, value: &str) -> String {
        self.translate_nested(value, 0)
    }

    fn translate_nested(&self, value: &str, depth: usize) -> String {
        if !value.contains("${") {
            return value.to_string();
        }
        if depth >= MAX_SUBSTITUTION_DEPTH {
            warn!("{}: placeholders in {:?} nested too deeply - not resolved", self.pom.origin, value);
            return value.to_string();
        }

        PLACEHOLDER_REGEX.replace_all(value, |caps: &Captures| {
            let key = &caps[1];
            match self.lookup(key) {
                Some(resolved) => self.translate_nested(&resolved, depth + 1),
                None => {
                    warn!("{}: property {:?} not resolved", self.pom.origin, key);
                    caps[0].to_string()
                }
            }
        }).into_owned()
    }

    fn lookup(&self, key: &str) -> Option<String> {
        if let Some(value) = self.pom.chain().find_map(|p| p.properties.get(key)) {
            trace!("{}: property {:?} resolved through explicit properties to {:?}", self.pom.origin, key, value);
            return Some(value.clone());
        }

        if let Some(name) = key.strip_prefix("env.") {
            let value = std::env::var(name).ok();
            if let Some(value) = &value {
                warn!("{}: property {:?} resolved through the environment to {:?} - this makes the resolution unreliable", self.pom.origin, key, value);
            }
            return value;
        }

        if let Some(field) = key.strip_prefix("project.").or_else(|| key.strip_prefix("pom.")) {
            let value = self.project_field(field);
            if value.is_none() {
                warn!("{}: property {:?} is not a supported project property", self.pom.origin, key);
            }
            return value;
        }

        if key.starts_with("settings.") {
            warn!("{}: property {:?} not resolved - settings.* properties are not supported", self.pom.origin, key);
            return None;
        }

        if let Some(value) = self.system_properties.get(key) {
            debug!("{}: property {:?} resolved to system property {:?}", self.pom.origin, key, value);
            return Some(value.clone());
        }
        None
    }

    fn project_field(&self, field: &str) -> Option<String> {
        let parent = self.pom.parent_reference.as_ref();
        match field {
            "modelVersion" => Some(SUPPORTED_MODEL_VERSION.to_string()),
            "groupId" => self.pom.inherited_group_id().cloned(),
            "artifactId" => self.pom.artifact_id.clone(),
            "version" => self.pom.inherited_version().cloned(),
            "packaging" => Some(self.pom.packaging.clone().unwrap_or_else(|| DEFAULT_PACKAGING.to_string())),
            "parent.groupId" => parent.map(|p| p.group_id.clone()),
            "parent.artifactId" => parent.map(|p| p.artifact_id.clone()),
            "parent.version" => parent.map(|p| p.version.clone()),
            _ => None,
        }
    }

    fn dependency(&self, raw: &RawPomDependency, repository: &Arc<Repository>) -> Dependency {
        let translate = |s: &Option<String>| s.as_deref().map(|s| self.translate(s)).unwrap_or_default();

        let mut id = DependencyId::new(translate(&raw.group_id), translate(&raw.artifact_id), translate(&raw.version))
            .with_preferred_repository(repository.clone());
        if let Some(classifier) = &raw.classifier {
            id = id.with_attribute(CLASSIFIER, self.translate(classifier));
        }
        if let Some(dependency_type) = &raw.dependency_type {
            id = id.with_attribute(TYPE, self.translate(dependency_type));
        }
        if let Some(scope) = &raw.scope {
            id = id.with_attribute(SCOPE, self.translate(scope).to_lowercase());
        }
        if let Some(optional) = &raw.optional {
            let optional = self.translate(optional).trim().eq_ignore_ascii_case("true");
            id = id.with_attribute(OPTIONAL, optional.to_string());
        }

        let exclusions = raw.exclusions.iter()
            .map(|e| DependencyExclusion::new(
                e.group_id.as_deref().map(|s| self.translate(s)).unwrap_or_else(|| DependencyExclusion::WILDCARD.to_string()),
                e.artifact_id.as_deref().map(|s| self.translate(s)).unwrap_or_else(|| DependencyExclusion::WILDCARD.to_string()),
                DependencyExclusion::WILDCARD,
            ))
            .collect();

        Dependency::with_exclusions(id, exclusions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// `compile`, `runtime`
    Transitive,
    /// `provided`, `test`, `system`
    NonTransitive,
    Illegal,
}
impl ScopeKind {
    pub fn of(scope: &str) -> ScopeKind {
        match scope.to_ascii_lowercase().as_str() {
            "compile" | "runtime" => ScopeKind::Transitive,
            "provided" | "test" | "system" => ScopeKind::NonTransitive,
            _ => ScopeKind::Illegal,
        }
    }
}

/// `<scope>import</scope>` of a `pom` typed entry in `<dependencyManagement>`
pub fn is_management_import(dependency: &Dependency) -> bool {
    dependency.id.packaging_type().eq_ignore_ascii_case("pom")
        && dependency.id.scope().eq_ignore_ascii_case("import")
}

/// A POM with parent inheritance and placeholders resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Pom {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: String,
    pub dependencies: Vec<Dependency>,
    pub dependency_management: Vec<Dependency>,
}

impl Pom {
    fn coordinates(&self) -> String {
        format!("{}:{}:{}",
                self.group_id.as_deref().unwrap_or("?"),
                self.artifact_id.as_deref().unwrap_or("?"),
                self.version.as_deref().unwrap_or("?"),
        )
    }

    fn managed_for<'a>(dependency: &Dependency, dependency_management: &'a [Dependency]) -> Option<&'a Dependency> {
        let id = &dependency.id;
        dependency_management.iter()
            .find(|managed| {
                let managed_id = &managed.id;
                id.group == managed_id.group
                    && id.name == managed_id.name
                    && id.packaging_type() == managed_id.packaging_type()
                    && id.classifier() == managed_id.classifier()
                    && (id.version.trim().is_empty() || id.version == managed_id.version)
                    && dependency.exclusions.iter().all(|e| managed.exclusions.contains(e))
            })
    }

    fn apply_management(dependency: &Dependency, managed: &Dependency) -> Dependency {
        let mut id = dependency.id.clone();
        if id.version.trim().is_empty() {
            id.version = managed.id.version.clone();
        }
        if id.explicit_attribute(&SCOPE).is_none() {
            if let Some(scope) = managed.id.explicit_attribute(&SCOPE) {
                id = id.with_attribute(SCOPE, scope);
            }
        }
        Dependency::with_exclusions(id, managed.exclusions.clone())
    }

    /// Substitutes `flat_management` (dependency management with imports already inlined) into the
    ///  declared dependencies. Dependencies with an unknown scope are dropped.
    pub fn resolve_effective_dependencies(self, flat_management: Vec<Dependency>) -> Pom {
        let mut dependencies = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            let effective = match Self::managed_for(dependency, &flat_management) {
                Some(managed) => {
                    trace!("{} in {} replaced with {} from dependency management", dependency, self.coordinates(), managed);
                    Self::apply_management(dependency, managed)
                }
                None => dependency.clone(),
            };

            match ScopeKind::of(effective.id.scope()) {
                ScopeKind::Transitive | ScopeKind::NonTransitive => dependencies.push(effective),
                ScopeKind::Illegal => warn!("illegal scope {:?} of {} in {} - dropping it", effective.id.scope(), dependency, self.coordinates()),
            }
        }

        Pom {
            dependencies,
            dependency_management: flat_management,
            ..self
        }
    }

    /// The dependencies that dependents of this POM inherit, i.e. those in `compile` or `runtime`
    ///  scope
    pub fn transitive_dependencies(&self) -> impl Iterator<Item=&Dependency> {
        self.dependencies.iter()
            .filter(|d| ScopeKind::of(d.id.scope()) == ScopeKind::Transitive)
    }
}
