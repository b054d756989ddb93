//! Checks applied to descriptors and repository names before any remote call.

use http::Uri;
use registry_model::{CredentialType, PathComponentType, Registry, RegistryType};

use crate::error::{AdapterError, AdapterErrorKind};

/// Check a registry descriptor before an adapter is bound to it.
///
/// The descriptor must be of type `expected`, have a usable `http(s)` URL, and
/// carry either no credential or one whose type is in `accepted` with the
/// fields that type needs. An all-empty credential counts as none. Returns the parsed base URI.
pub fn validate_registry(
    adapter: &'static str,
    registry: &Registry,
    expected: RegistryType,
    accepted: &[CredentialType],
) -> Result<Uri, AdapterError> {
    let invalid = |error: Box<dyn std::error::Error + Send + Sync>| {
        AdapterError::builder(adapter, AdapterErrorKind::InvalidConfig, error)
            .url(registry.url.clone())
            .build()
    };

    if registry.kind != expected {
        return Err(invalid(
            format!("descriptor is for {}, not {}", registry.kind, expected).into(),
        ));
    }

    if registry.url.trim().is_empty() {
        return Err(invalid("registry URL is empty".into()));
    }

    let base = api_client::uri::parse_base(&registry.url).map_err(|error| invalid(error.into()))?;

    if let Some(credential) = registry.effective_credential() {
        credential
            .check(accepted)
            .map_err(|error| invalid(error.into()))?;
    }

    if registry.insecure {
        tracing::warn!(
            registry = %registry.name,
            url = %registry.url,
            "insecure registry requested, certificates are still verified by the default transport"
        );
    }

    Ok(base)
}

/// Check that a repository name is a slash separated path with no empty segments.
pub fn validate_repository(adapter: &'static str, name: &str) -> Result<(), AdapterError> {
    if name.is_empty() || name.split('/').any(str::is_empty) {
        return Err(AdapterError::new(
            adapter,
            AdapterErrorKind::InvalidRepository,
            format!("malformed repository name {name:?}"),
        ));
    }

    Ok(())
}

/// Bring a repository name into the shape a registry can address.
///
/// [PathComponentType::OnlyTwo] registries put single segment names into the
/// `library` namespace and reject names deeper than two segments.
pub fn normalize_repository(
    adapter: &'static str,
    name: &str,
    path: PathComponentType,
) -> Result<String, AdapterError> {
    validate_repository(adapter, name)?;

    match path {
        PathComponentType::Flexible => Ok(name.to_owned()),
        PathComponentType::OnlyTwo => match name.split('/').count() {
            1 => Ok(format!("library/{name}")),
            2 => Ok(name.to_owned()),
            _ => Err(AdapterError::new(
                adapter,
                AdapterErrorKind::InvalidRepository,
                format!("{name:?} has more than two path segments"),
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_model::Credential;

    const BASIC: &[CredentialType] = &[CredentialType::Basic];

    #[test]
    fn descriptor_checks() {
        let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com");
        let base = validate_registry("harbor", &registry, RegistryType::Harbor, BASIC).unwrap();
        assert_eq!(base.host(), Some("harbor.example.com"));

        let error =
            validate_registry("harbor", &registry, RegistryType::DockerHub, BASIC).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);

        for url in ["", "   ", "not a url", "ftp://harbor.example.com"] {
            let registry = Registry::new(RegistryType::Harbor, url);
            let error =
                validate_registry("harbor", &registry, RegistryType::Harbor, BASIC).unwrap_err();
            assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig, "{url:?}");
        }
    }

    #[test]
    fn credential_shape_is_checked() {
        let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com")
            .with_credential(Credential::basic("", "password"));
        let error = validate_registry("harbor", &registry, RegistryType::Harbor, BASIC).unwrap_err();
        assert_eq!(error.kind(), AdapterErrorKind::InvalidConfig);

        let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com")
            .with_credential(Credential::new(CredentialType::OAuth, "", "token"));
        assert!(validate_registry("harbor", &registry, RegistryType::Harbor, BASIC).is_err());
    }

    #[test]
    fn empty_credential_is_anonymous() {
        let registry = Registry::new(RegistryType::DockerHub, "https://hub.docker.com")
            .with_credential(Credential::basic("", ""));
        assert!(validate_registry("docker-hub", &registry, RegistryType::DockerHub, BASIC).is_ok());
    }

    #[test]
    fn two_segment_normalization() {
        let only_two = PathComponentType::OnlyTwo;
        assert_eq!(
            normalize_repository("docker-hub", "nginx", only_two).unwrap(),
            "library/nginx"
        );
        assert_eq!(
            normalize_repository("docker-hub", "bitnami/redis", only_two).unwrap(),
            "bitnami/redis"
        );
        assert_eq!(
            normalize_repository("docker-hub", "a/b/c", only_two)
                .unwrap_err()
                .kind(),
            AdapterErrorKind::InvalidRepository
        );
        assert_eq!(
            normalize_repository("generic", "a/b/c", PathComponentType::Flexible).unwrap(),
            "a/b/c"
        );
        assert!(normalize_repository("generic", "a//b", PathComponentType::Flexible).is_err());
        assert!(normalize_repository("generic", "", PathComponentType::Flexible).is_err());
    }
}
