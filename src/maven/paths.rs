use std::borrow::Cow;

use lazy_static::lazy_static;
use regex::Regex;

use crate::maven::coordinates::*;
use crate::maven::repository::Repository;

lazy_static! {
    static ref UNIQUE_SNAPSHOT_REGEX: Regex = Regex::new(r"^\d{8}\.\d{6}-\d+$").unwrap();
}

const SNAPSHOT: &str = "SNAPSHOT";
pub const MAVEN_METADATA_FILE_NAME: &str = "maven-metadata.xml";

/// `<timestamp>-<buildNumber>` as published in a remote repository's `maven-metadata.xml`, e.g.
///  `20180424.190328-2`
pub fn is_unique_snapshot_version(s: &str) -> bool {
    UNIQUE_SNAPSHOT_REGEX.is_match(s)
}

fn version_directory(id: &DependencyId) -> String {
    format!("{}/{}/{}", id.group.replace('.', "/"), id.name, id.version)
}

/// The version as it appears in file names: for unique snapshots, the trailing `SNAPSHOT` is replaced
///  by the snapshot version
fn file_version(id: &DependencyId) -> Cow<str> {
    match id.explicit_attribute(&SNAPSHOT_VERSION) {
        Some(snapshot_version) if id.is_snapshot() && !snapshot_version.is_empty() => {
            let prefix = &id.version[..id.version.len() - SNAPSHOT.len()];
            Cow::Owned(format!("{}{}", prefix, snapshot_version))
        }
        _ => Cow::Borrowed(&id.version),
    }
}

/// `extension` without leading '.', e.g. "jar"
fn maven_file_name(id: &DependencyId, classifier: Option<&str>, extension: &str) -> String {
    let classifier_string = match classifier {
        None => "".to_string(),
        Some(c) => format!("-{}", c),
    };

    format!("{}-{}{}.{}",
            id.name,
            file_version(id),
            classifier_string,
            extension,
    )
}

/// The POM never carries a classifier, even if the coordinate does.
pub fn pom_path(id: &DependencyId) -> String {
    format!("{}/{}", version_directory(id), maven_file_name(id, None, "pom"))
}

pub fn artifact_path(id: &DependencyId, extension: &str) -> String {
    format!("{}/{}", version_directory(id), maven_file_name(id, id.classifier(), extension))
}

/// Path of the version-level `maven-metadata.xml`. Cached copies are stored per originating
///  repository, i.e. as `maven-metadata-<repository>.xml`.
pub fn maven_metadata_path(id: &DependencyId, cached_from: Option<&Repository>) -> String {
    match cached_from {
        None => format!("{}/{}", version_directory(id), MAVEN_METADATA_FILE_NAME),
        Some(repository) => format!("{}/maven-metadata-{}.xml", version_directory(id), repository.name()),
    }
}

/// Resolves a POM's `relativePath` against the repository path of the POM declaring it. A path that
///  does not end in `.xml` denotes a directory containing a `pom.xml`.
///
/// Returns `None` if the resulting path would leave the repository root.
pub fn resolve_relative_path(declaring_pom_path: &str, relative_path: &str) -> Option<String> {
    let relative_path = relative_path.trim().replace('\\', "/");
    if relative_path.is_empty() || relative_path.starts_with('/') {
        return None;
    }

    let mut segments = declaring_pom_path.split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    segments.pop();

    for segment in relative_path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s => segments.push(s),
        }
    }

    if !relative_path.ends_with(".xml") {
        segments.push("pom.xml");
    }
    if segments.is_empty() {
        return None;
    }
    Some(segments.join("/"))
}
