use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{null_as_default, Metadata, Registry, UnknownKey};

/// The kind of content a [Resource] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Any artifact, regardless of media type.
    Artifact,

    /// Container images.
    Image,

    /// Helm charts.
    Chart,
}

impl ResourceType {
    /// The serialized key for this resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Artifact => "artifact",
            ResourceType::Image => "image",
            ResourceType::Chart => "chart",
        }
    }

    /// Whether an artifact whose remote type is `artifact_type` counts as this
    /// resource type. `Artifact` admits everything, the others compare without
    /// regard to case.
    pub fn admits(&self, artifact_type: &str) -> bool {
        match self {
            ResourceType::Artifact => true,
            other => other.as_str().eq_ignore_ascii_case(artifact_type),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "artifact" => Ok(ResourceType::Artifact),
            "image" => Ok(ResourceType::Image),
            "chart" => Ok(ResourceType::Chart),
            _ => Err(UnknownKey::new("resource type", s)),
        }
    }
}

/// A repository, identified by its slash delimited name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    /// Full repository name, e.g. `library/nginx`.
    pub name: String,

    /// Metadata the adapter chose to carry over from the remote.
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Metadata,
}

impl Repository {
    /// A repository with no metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// One digest-identified unit inside a repository.
///
/// Tags and labels are sets: order is not significant and duplicates collapse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Remote artifact type, e.g. `IMAGE` or `CHART`.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Content digest, stable within a repository.
    #[serde(default)]
    pub digest: String,

    /// Label names attached to the artifact.
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: BTreeSet<String>,

    /// Tag names pointing at the artifact.
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: BTreeSet<String>,
}

impl Artifact {
    /// An artifact with no tags or labels.
    pub fn new(kind: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            digest: digest.into(),
            labels: BTreeSet::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Add tags.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Add labels.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }
}

/// What a [Resource] describes: one repository and some of its artifacts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// The repository.
    #[serde(default)]
    pub repository: Option<Repository>,

    /// Artifacts in the repository.
    #[serde(default, deserialize_with = "null_as_default")]
    pub artifacts: Vec<Artifact>,

    /// Flattened tag names, superseded by `artifacts[].tags`.
    ///
    /// Always serialized, usually empty.
    #[serde(rename = "v_tags", default, deserialize_with = "null_as_default")]
    pub vtags: Vec<String>,
}

impl ResourceMetadata {
    /// Metadata for `repository` and its `artifacts`.
    pub fn new(repository: Repository, artifacts: Vec<Artifact>) -> Self {
        Self {
            repository: Some(repository),
            artifacts,
            vtags: Vec::new(),
        }
    }
}

/// The unit the replication engine diffs, copies and deletes.
///
/// When `deleted` is set, the metadata describes what was removed. With
/// `is_delete_tag` as well, the deletion is narrowed to the tags listed on
/// the artifacts rather than the whole repository. `overrides` asks the
/// consumer to replace existing content at the target instead of merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Kind of content.
    #[serde(rename = "type")]
    pub kind: ResourceType,

    /// Repository and artifacts.
    #[serde(default)]
    pub metadata: Option<ResourceMetadata>,

    /// Where the resource was found.
    #[serde(default)]
    pub registry: Option<Registry>,

    /// Adapter specific extras.
    #[serde(default, deserialize_with = "null_as_default")]
    pub extended_info: crate::Metadata,

    /// The resource was removed at the source.
    #[serde(default)]
    pub deleted: bool,

    /// The removal is limited to a tag.
    #[serde(default)]
    pub is_delete_tag: bool,

    /// Replace rather than merge at the target.
    #[serde(rename = "override", default)]
    pub overrides: bool,
}

impl Resource {
    /// A resource for `repository` holding `artifacts`.
    pub fn new(kind: ResourceType, repository: Repository, artifacts: Vec<Artifact>) -> Self {
        Self {
            kind,
            metadata: Some(ResourceMetadata::new(repository, artifacts)),
            registry: None,
            extended_info: Metadata::new(),
            deleted: false,
            is_delete_tag: false,
            overrides: false,
        }
    }

    /// A resource recording that `tag` was removed from `repository`.
    pub fn tag_deletion(
        kind: ResourceType,
        repository: impl Into<String>,
        tag: impl Into<String>,
    ) -> Self {
        let artifact = Artifact::default().with_tags([tag]);
        Self {
            deleted: true,
            is_delete_tag: true,
            ..Self::new(kind, Repository::new(repository), vec![artifact])
        }
    }

    /// Record where the resource came from.
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// The name of the repository this resource describes.
    pub fn repository_name(&self) -> Option<&str> {
        self.metadata
            .as_ref()?
            .repository
            .as_ref()
            .map(|repository| repository.name.as_str())
    }

    /// The artifacts this resource describes.
    pub fn artifacts(&self) -> &[Artifact] {
        self.metadata
            .as_ref()
            .map(|metadata| metadata.artifacts.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RegistryType;

    fn sample() -> Resource {
        let mut metadata = Metadata::new();
        metadata.insert("public".into(), "true".into());

        Resource::new(
            ResourceType::Image,
            Repository::new("library/hello-world").with_metadata(metadata),
            vec![
                Artifact::new("IMAGE", "sha256:aaa").with_tags(["latest", "v1"]),
                Artifact::new("IMAGE", "sha256:bbb"),
            ],
        )
        .with_registry(
            Registry::new(RegistryType::Harbor, "https://harbor.example.com").with_name("source"),
        )
    }

    #[test]
    fn json_shape() {
        let value = serde_json::to_value(sample()).unwrap();

        assert_eq!(value["type"], "image");
        assert_eq!(value["metadata"]["repository"]["name"], "library/hello-world");
        assert_eq!(value["metadata"]["v_tags"], serde_json::json!([]));
        assert_eq!(
            value["metadata"]["artifacts"][0]["tags"],
            serde_json::json!(["latest", "v1"])
        );
        assert_eq!(value["metadata"]["artifacts"][1]["labels"], serde_json::json!([]));
        assert_eq!(value["metadata"]["artifacts"][1]["tags"], serde_json::json!([]));
        assert_eq!(value["registry"]["type"], "harbor");
        assert_eq!(value["deleted"], false);
        assert_eq!(value["is_delete_tag"], false);
        assert_eq!(value["override"], false);
        assert_eq!(value["extended_info"], serde_json::json!({}));
    }

    #[test]
    fn json_round_trip() {
        let resource = sample();
        let json = serde_json::to_string(&resource).unwrap();
        let decoded: Resource = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, resource);
        assert!(decoded.artifacts()[1].labels.is_empty());
        assert!(decoded.artifacts()[1].tags.is_empty());
        assert!(decoded.metadata.unwrap().vtags.is_empty());
    }

    #[test]
    fn decode_legacy_nulls() {
        let resource: Resource = serde_json::from_str(indoc::indoc! {r#"
            {
                "type": "image",
                "metadata": {
                    "repository": {"name": "library/busybox", "metadata": null},
                    "artifacts": [{"type": "IMAGE", "digest": "sha256:ccc", "labels": null, "tags": ["1.36"]}],
                    "v_tags": null
                },
                "registry": null,
                "extended_info": null,
                "deleted": false,
                "is_delete_tag": false,
                "override": true
            }
        "#})
        .unwrap();

        assert_eq!(resource.repository_name(), Some("library/busybox"));
        assert!(resource.overrides);
        assert!(resource.artifacts()[0].labels.is_empty());
    }

    #[test]
    fn tags_are_sets() {
        let a = Artifact::new("IMAGE", "sha256:aaa").with_tags(["v2", "v1", "v1"]);
        let b = Artifact::new("IMAGE", "sha256:aaa").with_tags(["v1", "v2"]);
        assert_eq!(a, b);
        assert_eq!(a.tags.len(), 2);
    }

    #[test]
    fn tag_deletion() {
        let resource = Resource::tag_deletion(ResourceType::Image, "library/nginx", "1.25");
        assert!(resource.deleted);
        assert!(resource.is_delete_tag);
        assert_eq!(resource.repository_name(), Some("library/nginx"));
        assert!(resource.artifacts()[0].tags.contains("1.25"));
    }

    #[test]
    fn resource_type_admits() {
        assert!(ResourceType::Image.admits("IMAGE"));
        assert!(!ResourceType::Image.admits("CHART"));
        assert!(ResourceType::Artifact.admits("CNAB"));
        assert_eq!("Chart".parse::<ResourceType>().unwrap(), ResourceType::Chart);
        assert!("helm".parse::<ResourceType>().is_err());
    }
}
