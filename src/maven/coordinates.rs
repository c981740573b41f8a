use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::maven::repository::Repository;

/// Key of an entry in [DependencyId::attributes].
///
/// `makes_unique` decides whether two coordinates that differ only in this attribute are different
///  coordinates. When a coordinate does not set the attribute explicitly, `default_value` (if any)
///  is used in its place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyAttribute {
    pub name: Cow<'static, str>,
    pub makes_unique: bool,
    pub default_value: Option<Cow<'static, str>>,
}
impl DependencyAttribute {
    pub const fn new(name: &'static str, makes_unique: bool, default_value: Option<&'static str>) -> DependencyAttribute {
        DependencyAttribute {
            name: Cow::Borrowed(name),
            makes_unique,
            default_value: match default_value {
                Some(v) => Some(Cow::Borrowed(v)),
                None => None,
            },
        }
    }
}
impl Display for DependencyAttribute {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

pub const DEFAULT_TYPE: &str = "jar";
pub const DEFAULT_SCOPE: &str = "compile";

/// Variant of the same artifact, e.g. `sources`, `javadoc`, `linux-x86_64`
pub const CLASSIFIER: DependencyAttribute = DependencyAttribute::new("m2-classifier", true, None);
/// Overrides the packaging declared by the POM, i.e. decides which file is retrieved. `pom` retrieves
///  the descriptor itself.
pub const TYPE: DependencyAttribute = DependencyAttribute::new("m2-type", true, Some(DEFAULT_TYPE));
/// Only used for filtering, see [default_exclusions]
pub const SCOPE: DependencyAttribute = DependencyAttribute::new("m2-scope", false, Some(DEFAULT_SCOPE));
pub const OPTIONAL: DependencyAttribute = DependencyAttribute::new("m2-optional", false, Some("false"));
/// `<timestamp>-<buildNumber>` of a unique snapshot build, replaces `SNAPSHOT` in file names
pub const SNAPSHOT_VERSION: DependencyAttribute = DependencyAttribute::new("m2-snapshot-version", true, None);

pub const SOURCES_CLASSIFIER: &str = "sources";
pub const JAVADOC_CLASSIFIER: &str = "javadoc";

/// Identifies a project / module to be resolved: group, name and version plus typed attributes.
///
/// Equality takes group, name, version and every unique-making attribute into account (using the
///  attribute's default where unset). The hash only covers group, name and version, because
///  attribute defaults must never move an id to a different bucket.
#[derive(Debug, Clone)]
pub struct DependencyId {
    pub group: String,
    pub name: String,
    pub version: String,
    /// Repository to search first (its cache even earlier). Not part of the identity.
    pub preferred_repository: Option<Arc<Repository>>,
    pub attributes: BTreeMap<DependencyAttribute, String>,
}
impl DependencyId {
    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> DependencyId {
        DependencyId {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            preferred_repository: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: DependencyAttribute, value: impl Into<String>) -> DependencyId {
        self.attributes.insert(attribute, value.into());
        self
    }

    pub fn with_preferred_repository(mut self, repository: Arc<Repository>) -> DependencyId {
        self.preferred_repository = Some(repository);
        self
    }

    /// explicit value, falling back to the attribute's default
    pub fn attribute<'a>(&'a self, attribute: &'a DependencyAttribute) -> Option<&'a str> {
        self.attributes.get(attribute)
            .map(String::as_str)
            .or(attribute.default_value.as_deref())
    }

    pub fn explicit_attribute(&self, attribute: &DependencyAttribute) -> Option<&str> {
        self.attributes.get(attribute).map(String::as_str)
    }

    pub fn is_snapshot(&self) -> bool {
        self.version.ends_with("-SNAPSHOT")
    }

    pub fn classifier(&self) -> Option<&str> {
        self.explicit_attribute(&CLASSIFIER).filter(|c| !c.is_empty())
    }

    pub fn packaging_type(&self) -> &str {
        self.explicit_attribute(&TYPE).unwrap_or(DEFAULT_TYPE)
    }

    pub fn scope(&self) -> &str {
        self.explicit_attribute(&SCOPE).unwrap_or(DEFAULT_SCOPE)
    }

    pub fn is_optional(&self) -> bool {
        self.explicit_attribute(&OPTIONAL)
            .map(|o| o.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    fn unique_attributes_match(&self, other: &DependencyId) -> bool {
        self.attributes.keys()
            .chain(other.attributes.keys())
            .filter(|key| key.makes_unique)
            .all(|key| self.attribute(key) == other.attribute(key))
    }
}

impl PartialEq for DependencyId {
    fn eq(&self, other: &Self) -> bool {
        self.group == other.group
            && self.name == other.name
            && self.version == other.version
            && self.unique_attributes_match(other)
    }
}
impl Eq for DependencyId {}

impl Hash for DependencyId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.group.hash(state);
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl Display for DependencyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if let Some(repository) = &self.preferred_repository {
            write!(f, "@{}", repository.name())?;
        }
        for (key, value) in &self.attributes {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Removes matching transitive dependencies from the graph below the point where it is declared.
///
/// `group`, `name` and `version` are either literal values or `"*"`. Each entry of `attributes` must
///  be present on the coordinate with exactly that value, or with any value if the pattern is `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyExclusion {
    pub group: String,
    pub name: String,
    pub version: String,
    pub attributes: BTreeMap<DependencyAttribute, String>,
}
impl DependencyExclusion {
    pub const WILDCARD: &'static str = "*";

    pub fn new(group: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> DependencyExclusion {
        DependencyExclusion {
            group: group.into(),
            name: name.into(),
            version: version.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// matches every coordinate that has `attribute` set to `value`
    pub fn by_attribute(attribute: DependencyAttribute, value: impl Into<String>) -> DependencyExclusion {
        DependencyExclusion::new(Self::WILDCARD, Self::WILDCARD, Self::WILDCARD)
            .with_attribute(attribute, value)
    }

    pub fn with_attribute(mut self, attribute: DependencyAttribute, value: impl Into<String>) -> DependencyExclusion {
        self.attributes.insert(attribute, value.into());
        self
    }

    fn matches(pattern: &str, value: Option<&str>) -> bool {
        match value {
            Some(value) => pattern == Self::WILDCARD || pattern == value,
            None => false,
        }
    }

    pub fn excludes(&self, id: &DependencyId) -> bool {
        Self::matches(&self.group, Some(&id.group))
            && Self::matches(&self.name, Some(&id.name))
            && Self::matches(&self.version, Some(&id.version))
            && self.attributes.iter()
                .all(|(key, pattern)| Self::matches(pattern, id.explicit_attribute(key)))
    }
}

impl Display for DependencyExclusion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)?;
        if !self.attributes.is_empty() {
            let attributes = self.attributes.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>();
            write!(f, " {{{}}}", attributes.join(", "))?;
        }
        Ok(())
    }
}

lazy_static! {
    /// Filters what Maven considers optional, and the non-transitive `provided`, `test` and `system`
    ///  scopes
    static ref DEFAULT_EXCLUSIONS: Vec<DependencyExclusion> = vec![
        DependencyExclusion::by_attribute(OPTIONAL, "true"),
        DependencyExclusion::by_attribute(SCOPE, "provided"),
        DependencyExclusion::by_attribute(SCOPE, "test"),
        DependencyExclusion::by_attribute(SCOPE, "system"),
    ];
}

pub fn default_exclusions() -> Vec<DependencyExclusion> {
    DEFAULT_EXCLUSIONS.clone()
}

/// "Depend on `id`, but not on anything matching `exclusions` from here down"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub id: DependencyId,
    pub exclusions: Vec<DependencyExclusion>,
}
impl Dependency {
    pub fn new(id: DependencyId) -> Dependency {
        Dependency {
            id,
            exclusions: default_exclusions(),
        }
    }

    pub fn with_exclusions(id: DependencyId, exclusions: Vec<DependencyExclusion>) -> Dependency {
        Dependency {
            id,
            exclusions,
        }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.exclusions == *DEFAULT_EXCLUSIONS {
            return write!(f, "{}", self.id);
        }
        let exclusions = self.exclusions.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "{}, exclusions=[{}]", self.id, exclusions.join("; "))
    }
}
