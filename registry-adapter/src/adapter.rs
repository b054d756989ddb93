use std::fmt;

use registry_model::{AdapterInfo, Filter, HealthStatus, Registry, Resource};
use tokio_util::sync::CancellationToken;

use crate::error::AdapterError;
use crate::matcher::expand_wildcard_namespace;

/// A remote registry, seen through the canonical model.
///
/// One adapter is bound to one [Registry] descriptor for its lifetime. It
/// holds no mutable state besides its HTTP client, so a single instance can be
/// shared across tasks behind an `Arc`.
///
/// Every network call takes a [CancellationToken]. Once it fires, no further
/// request is issued and the call fails with
/// [AdapterErrorKind::Canceled](crate::AdapterErrorKind::Canceled). Adapters
/// never retry.
#[async_trait::async_trait]
pub trait Adapter: fmt::Debug + Send + Sync {
    /// The fixed capability descriptor for this registry type.
    fn info(&self) -> Result<AdapterInfo, AdapterError>;

    /// The descriptor this adapter is bound to.
    fn registry(&self) -> &Registry;

    /// Resolve a namespace pattern to candidate namespaces.
    ///
    /// Supports exact namespaces and a trailing `/*`.
    async fn list_namespaces(
        &self,
        pattern: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, AdapterError> {
        ensure_active("namespace", cancel)?;
        expand_wildcard_namespace(pattern)
    }

    /// List repositories and their artifacts, with `filters` applied.
    ///
    /// Resources are built fresh on each call, one per repository with at
    /// least one matching artifact, in the order the remote listed them.
    async fn fetch_artifacts(
        &self,
        filters: &[Filter],
        cancel: &CancellationToken,
    ) -> Result<Vec<Resource>, AdapterError>;

    /// Delete exactly one tag from a repository.
    ///
    /// Registries which cannot remove a tag without touching other tags fail
    /// with [AdapterErrorKind::Unsupported](crate::AdapterErrorKind::Unsupported).
    async fn delete_tag(
        &self,
        repository: &str,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<(), AdapterError>;

    /// Find the repository which owns a blob.
    ///
    /// `None` means no repository owns it, which is not an error. Registries
    /// without a reverse index always answer `None`.
    async fn repository_by_blob_digest(
        &self,
        digest: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, AdapterError> {
        ensure_active("blob lookup", cancel)?;
        tracing::trace!(%digest, "no reverse blob index");
        Ok(None)
    }

    /// Probe whether the remote answers.
    async fn health_check(&self, cancel: &CancellationToken) -> Result<HealthStatus, AdapterError>;
}

/// Fail with [AdapterErrorKind::Canceled](crate::AdapterErrorKind::Canceled)
/// once `cancel` has fired.
pub fn ensure_active(adapter: &'static str, cancel: &CancellationToken) -> Result<(), AdapterError> {
    if cancel.is_cancelled() {
        tracing::debug!(adapter, "operation cancelled");
        return Err(AdapterError::canceled(adapter));
    }
    Ok(())
}

/// Turn the outcome of a health check request into a status.
///
/// A remote which answered with an error, or could not be reached, is
/// unhealthy. Cancellation is still an error.
pub fn health_from<T>(result: Result<T, AdapterError>) -> Result<HealthStatus, AdapterError> {
    match result {
        Ok(_) => Ok(HealthStatus::Healthy),
        Err(error) if error.kind() == crate::AdapterErrorKind::Canceled => Err(error),
        Err(error) => {
            tracing::debug!(%error, "health check failed");
            Ok(HealthStatus::Unhealthy)
        }
    }
}
