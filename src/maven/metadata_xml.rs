#![allow(non_snake_case)]

use anyhow::anyhow;
use serde::Deserialize;

use crate::maven::paths::is_unique_snapshot_version;

/// The subset of a version-level `maven-metadata.xml` needed to find the newest build of a unique
///  snapshot, see https://maven.apache.org/ref/3.9.5/maven-repository-metadata/repository-metadata.html
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Metadata {
    pub groupId: Option<String>,
    pub artifactId: Option<String>,
    pub version: Option<String>,
    pub versioning: Option<Versioning>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Versioning {
    pub lastUpdated: Option<String>,
    pub snapshot: Option<Snapshot>,
    pub snapshotVersions: Option<SnapshotVersions>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Snapshot {
    pub timestamp: Option<String>,
    pub buildNumber: Option<String>,
    pub localCopy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SnapshotVersions {
    #[serde(default)]
    pub snapshotVersion: Vec<SnapshotVersion>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SnapshotVersion {
    pub classifier: Option<String>,
    pub extension: Option<String>,
    pub value: Option<String>,
    pub updated: Option<String>,
}

impl Metadata {
    pub fn parse(data: &[u8]) -> anyhow::Result<Metadata> {
        serde_xml_rs::from_reader(data)
            .map_err(|e| anyhow!("malformed maven-metadata.xml: {}", e))
    }

    /// `<timestamp>-<buildNumber>` of the newest build, e.g. `20180424.190328-2`.
    ///
    /// Taken from `<snapshot>`, or from the unclassified `pom` entry of `<snapshotVersions>` if
    ///  `<snapshot>` is incomplete. `base_version` is the `-SNAPSHOT` version the metadata describes.
    pub fn unique_snapshot_version(&self, base_version: &str) -> anyhow::Result<String> {
        let versioning = self.versioning.as_ref()
            .ok_or_else(|| anyhow!("maven-metadata.xml has no <versioning>"))?;

        if let Some(snapshot) = &versioning.snapshot {
            if let (Some(timestamp), Some(build_number)) = (&snapshot.timestamp, &snapshot.buildNumber) {
                let result = format!("{}-{}", timestamp.trim(), build_number.trim());
                if is_unique_snapshot_version(&result) {
                    return Ok(result);
                }
                return Err(anyhow!("malformed snapshot version {:?} in maven-metadata.xml", result));
            }
        }

        let prefix = format!("{}-", base_version.trim_end_matches("SNAPSHOT").trim_end_matches('-'));
        versioning.snapshotVersions.iter()
            .flat_map(|v| v.snapshotVersion.iter())
            .filter(|v| v.extension.as_deref() == Some("pom") && v.classifier.as_deref().unwrap_or("").is_empty())
            .filter_map(|v| v.value.as_deref()?.strip_prefix(&prefix))
            .find(|v| is_unique_snapshot_version(v))
            .map(str::to_string)
            .ok_or_else(|| anyhow!("maven-metadata.xml has no snapshot timestamp"))
    }
}
