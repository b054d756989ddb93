use serde::{Deserialize, Serialize};

use crate::{FilterType, RegistryType, ResourceType};

/// How many path segments a registry allows in a repository name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PathComponentType {
    /// Exactly `namespace/repository`.
    OnlyTwo,

    /// Any depth.
    #[default]
    Flexible,
}

/// What may start a replication from a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Started by a user.
    Manual,

    /// Started on a schedule.
    Scheduled,

    /// Started by a push or delete event at the source.
    EventBased,
}

/// Result of probing a remote registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The registry answered.
    Healthy,

    /// The registry did not answer, or answered with an error.
    Unhealthy,
}

/// What an adapter for one registry type can do.
///
/// Fixed per registry type, not per descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterInfo {
    /// The registry type described.
    #[serde(rename = "type")]
    pub registry_type: RegistryType,

    /// Short human readable description.
    #[serde(default)]
    pub description: String,

    /// Resource types the adapter can list.
    pub supported_resource_types: Vec<ResourceType>,

    /// Filter kinds the adapter honors.
    #[serde(default)]
    pub supported_resource_filters: Vec<FilterType>,

    /// Triggers the registry can serve.
    #[serde(default)]
    pub supported_triggers: Vec<TriggerType>,

    /// Repository name depth.
    #[serde(default)]
    pub supported_repository_path_component_type: PathComponentType,
}

impl AdapterInfo {
    /// Whether `kind` is among the supported resource types.
    ///
    /// [ResourceType::Artifact] overlaps every type, on either side.
    pub fn supports(&self, kind: ResourceType) -> bool {
        self.supported_resource_types.iter().any(|supported| {
            *supported == kind
                || *supported == ResourceType::Artifact
                || kind == ResourceType::Artifact
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_resource_types() {
        let info = AdapterInfo {
            registry_type: RegistryType::DockerHub,
            description: String::new(),
            supported_resource_types: vec![ResourceType::Image],
            supported_resource_filters: vec![FilterType::Name, FilterType::Tag],
            supported_triggers: vec![TriggerType::Manual],
            supported_repository_path_component_type: PathComponentType::OnlyTwo,
        };

        assert!(info.supports(ResourceType::Image));
        assert!(!info.supports(ResourceType::Chart));
        assert!(info.supports(ResourceType::Artifact));

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["supported_repository_path_component_type"], "OnlyTwo");
        assert_eq!(json["supported_triggers"], serde_json::json!(["manual"]));
    }
}
