//! Plain serde records for handing repositories, coordinates and resolution results to other tools
//!  (e.g. IDE integrations) as JSON, with explicit conversion functions in both directions.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::maven::coordinates::{Dependency, DependencyAttribute, DependencyExclusion, DependencyId};
use crate::maven::repository::{Repository, DEFAULT_SNAPSHOT_UPDATE_DELAY};
use crate::resolver::ResolvedDependency;
use crate::util::checksum::Checksum;

fn default_true() -> bool {
    true
}

fn default_snapshot_update_delay_secs() -> u64 {
    DEFAULT_SNAPSHOT_UPDATE_DELAY.as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepositoryRecord {
    Local {
        name: String,
        path: PathBuf,
        #[serde(default = "default_true")]
        releases: bool,
        #[serde(default = "default_true")]
        snapshots: bool,
        #[serde(default)]
        checksum: Checksum,
        #[serde(default)]
        tolerate_checksum_mismatch: bool,
    },
    Remote {
        name: String,
        url: Url,
        /// must be a `local` record; the default local repository if absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache: Option<Box<RepositoryRecord>>,
        #[serde(default = "default_true")]
        releases: bool,
        #[serde(default = "default_true")]
        snapshots: bool,
        #[serde(default)]
        checksum: Checksum,
        #[serde(default)]
        tolerate_checksum_mismatch: bool,
        #[serde(default = "default_snapshot_update_delay_secs")]
        snapshot_update_delay_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub name: String,
    pub makes_unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyIdRecord {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_repository: Option<RepositoryRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub group: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyRecord {
    pub id: DependencyIdRecord,
    #[serde(default)]
    pub exclusions: Vec<ExclusionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedDependencyRecord {
    pub id: DependencyIdRecord,
    #[serde(default)]
    pub dependencies: Vec<DependencyRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_from: Option<RepositoryRecord>,
    pub has_error: bool,
    #[serde(default)]
    pub log: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

pub fn encode_repository(repository: &Repository) -> RepositoryRecord {
    match repository.local_path() {
        Some(path) => RepositoryRecord::Local {
            name: repository.name().to_string(),
            path,
            releases: repository.releases(),
            snapshots: repository.snapshots(),
            checksum: repository.checksum(),
            tolerate_checksum_mismatch: repository.tolerates_checksum_mismatch(),
        },
        None => RepositoryRecord::Remote {
            name: repository.name().to_string(),
            url: repository.url().clone(),
            cache: repository.cache().map(|cache| Box::new(encode_repository(cache))),
            releases: repository.releases(),
            snapshots: repository.snapshots(),
            checksum: repository.checksum(),
            tolerate_checksum_mismatch: repository.tolerates_checksum_mismatch(),
            snapshot_update_delay_secs: repository.snapshot_update_delay().as_secs(),
        },
    }
}

pub fn decode_repository(record: &RepositoryRecord) -> anyhow::Result<Repository> {
    match record {
        RepositoryRecord::Local { name, path, releases, snapshots, checksum, tolerate_checksum_mismatch } => {
            Ok(Repository::local(name, path)?
                .with_releases(*releases)
                .with_snapshots(*snapshots)
                .with_checksum(*checksum)
                .tolerating_checksum_mismatch(*tolerate_checksum_mismatch))
        }
        RepositoryRecord::Remote { name, url, cache, releases, snapshots, checksum, tolerate_checksum_mismatch, snapshot_update_delay_secs } => {
            if url.scheme() == "file" {
                bail!("remote repository {} has local URL {} - use a local repository instead", name, url);
            }

            let mut repository = Repository::new(name, url.clone());
            if let Some(cache) = cache {
                if let RepositoryRecord::Remote { name: cache_name, .. } = cache.as_ref() {
                    bail!("cache {} of repository {} is not a local repository", cache_name, name);
                }
                repository = repository.with_cache(Some(Arc::new(decode_repository(cache)?)));
            }

            Ok(repository
                .with_releases(*releases)
                .with_snapshots(*snapshots)
                .with_checksum(*checksum)
                .tolerating_checksum_mismatch(*tolerate_checksum_mismatch)
                .with_snapshot_update_delay(Duration::from_secs(*snapshot_update_delay_secs)))
        }
    }
}

fn encode_attributes(attributes: &BTreeMap<DependencyAttribute, String>) -> Vec<AttributeRecord> {
    attributes.iter()
        .map(|(attribute, value)| AttributeRecord {
            name: attribute.name.to_string(),
            makes_unique: attribute.makes_unique,
            default_value: attribute.default_value.as_ref().map(|v| v.to_string()),
            value: value.clone(),
        })
        .collect()
}

fn decode_attributes(records: &[AttributeRecord]) -> BTreeMap<DependencyAttribute, String> {
    records.iter()
        .map(|r| {
            let attribute = DependencyAttribute {
                name: Cow::Owned(r.name.clone()),
                makes_unique: r.makes_unique,
                default_value: r.default_value.clone().map(Cow::Owned),
            };
            (attribute, r.value.clone())
        })
        .collect()
}

pub fn encode_dependency_id(id: &DependencyId) -> DependencyIdRecord {
    DependencyIdRecord {
        group: id.group.clone(),
        name: id.name.clone(),
        version: id.version.clone(),
        preferred_repository: id.preferred_repository.as_deref().map(encode_repository),
        attributes: encode_attributes(&id.attributes),
    }
}

pub fn decode_dependency_id(record: &DependencyIdRecord) -> anyhow::Result<DependencyId> {
    let mut id = DependencyId::new(&record.group, &record.name, &record.version);
    if let Some(repository) = &record.preferred_repository {
        id = id.with_preferred_repository(Arc::new(decode_repository(repository)?));
    }
    id.attributes = decode_attributes(&record.attributes);
    Ok(id)
}

pub fn encode_exclusion(exclusion: &DependencyExclusion) -> ExclusionRecord {
    ExclusionRecord {
        group: exclusion.group.clone(),
        name: exclusion.name.clone(),
        version: exclusion.version.clone(),
        attributes: encode_attributes(&exclusion.attributes),
    }
}

pub fn decode_exclusion(record: &ExclusionRecord) -> DependencyExclusion {
    DependencyExclusion {
        group: record.group.clone(),
        name: record.name.clone(),
        version: record.version.clone(),
        attributes: decode_attributes(&record.attributes),
    }
}

pub fn encode_dependency(dependency: &Dependency) -> DependencyRecord {
    DependencyRecord {
        id: encode_dependency_id(&dependency.id),
        exclusions: dependency.exclusions.iter().map(encode_exclusion).collect(),
    }
}

pub fn decode_dependency(record: &DependencyRecord) -> anyhow::Result<Dependency> {
    Ok(Dependency::with_exclusions(
        decode_dependency_id(&record.id)?,
        record.exclusions.iter().map(decode_exclusion).collect(),
    ))
}

/// The artifact content is not part of the record, it is read from `artifact` when needed
pub fn encode_resolved_dependency(resolved: &ResolvedDependency) -> ResolvedDependencyRecord {
    ResolvedDependencyRecord {
        id: encode_dependency_id(&resolved.id),
        dependencies: resolved.dependencies.iter().map(encode_dependency).collect(),
        resolved_from: resolved.resolved_from.as_deref().map(encode_repository),
        has_error: resolved.has_error,
        log: resolved.log.clone(),
        artifact: resolved.artifact.clone(),
    }
}

pub fn decode_resolved_dependency(record: &ResolvedDependencyRecord) -> anyhow::Result<ResolvedDependency> {
    let dependencies = record.dependencies.iter()
        .map(decode_dependency)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let resolved_from = match &record.resolved_from {
        Some(repository) => Some(Arc::new(decode_repository(repository)?)),
        None => None,
    };
    Ok(ResolvedDependency::new(
        decode_dependency_id(&record.id)?,
        dependencies,
        resolved_from,
        record.has_error,
        record.log.clone(),
        record.artifact.clone(),
        None,
    ))
}

pub fn to_json<T: Serialize>(record: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

pub fn from_json<T: DeserializeOwned>(json: &str) -> anyhow::Result<T> {
    Ok(serde_json::from_str(json)?)
}
