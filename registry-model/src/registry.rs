use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Credential, UnknownKey};

/// The kind of remote registry a descriptor points at.
///
/// The serialized keys are persisted in replication policies and are never
/// renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RegistryType {
    /// Docker Hub, `hub.docker.com`.
    #[serde(rename = "docker-hub")]
    DockerHub,

    /// Another Harbor instance, spoken to over the v2.0 API.
    #[serde(rename = "harbor")]
    Harbor,

    /// Any registry implementing the OCI distribution API.
    #[serde(rename = "docker-registry", alias = "generic")]
    Generic,
}

impl RegistryType {
    /// Every known registry type.
    pub const ALL: [RegistryType; 3] = [
        RegistryType::DockerHub,
        RegistryType::Harbor,
        RegistryType::Generic,
    ];

    /// The persisted key for this registry type.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryType::DockerHub => "docker-hub",
            RegistryType::Harbor => "harbor",
            RegistryType::Generic => "docker-registry",
        }
    }
}

impl fmt::Display for RegistryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistryType {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "docker-hub" => Ok(RegistryType::DockerHub),
            "harbor" => Ok(RegistryType::Harbor),
            "docker-registry" | "generic" => Ok(RegistryType::Generic),
            _ => Err(UnknownKey::new("registry type", s)),
        }
    }
}

/// A remote registry endpoint.
///
/// Descriptors are supplied by the persistence layer and are read-only here.
/// The credential is accepted when deserializing, but is never serialized, so
/// it cannot leak into a [Resource](crate::Resource) handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    /// Identifier assigned by the persistence layer.
    #[serde(default)]
    pub id: i64,

    /// Human readable name.
    #[serde(default)]
    pub name: String,

    /// Which adapter speaks to this registry.
    #[serde(rename = "type")]
    pub kind: RegistryType,

    /// Base URL of the registry API.
    pub url: String,

    /// How to authenticate, if at all.
    #[serde(default, skip_serializing)]
    pub credential: Option<Credential>,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,
}

impl Registry {
    /// A registry descriptor with no credential.
    pub fn new(kind: RegistryType, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: String::new(),
            kind,
            url: url.into(),
            credential: None,
            insecure: false,
        }
    }

    /// Set the descriptor name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a credential.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// The credential to authenticate with, if any.
    ///
    /// A credential whose key and secret are both empty means anonymous access.
    pub fn effective_credential(&self) -> Option<&Credential> {
        self.credential
            .as_ref()
            .filter(|credential| !credential.is_anonymous())
    }
}
