//! # Registry model
//!
//! The vocabulary every registry adapter maps into and out of: registry
//! descriptors, repositories, artifacts, the [Resource] unit handed to the
//! replication engine, listing [Filter]s, and the [AdapterInfo] capability
//! descriptor.
//!
//! The JSON shape of these types is a stable contract with whatever persists
//! and exchanges them, so field names here never change.

use serde::{Deserialize, Deserializer};

mod filter;
mod info;
mod registry;
mod resource;

pub use credential::{Credential, CredentialType, Secret};
pub use filter::{Filter, FilterType};
pub use info::{AdapterInfo, HealthStatus, PathComponentType, TriggerType};
pub use registry::{Registry, RegistryType};
pub use resource::{Artifact, Repository, Resource, ResourceMetadata, ResourceType};

/// Free-form metadata attached to repositories and resources.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// An identifier was not one of the known keys.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: {value:?}")]
pub struct UnknownKey {
    what: &'static str,
    value: String,
}

impl UnknownKey {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_owned(),
        }
    }

    /// The value which was not recognized.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Treat an explicit `null` like a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
