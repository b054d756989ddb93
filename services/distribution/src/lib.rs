//! Adapter for registries which implement the OCI distribution API.
//!
//! Repositories come from `/v2/_catalog` and tags from
//! `/v2/<name>/tags/list`, both paged with `Link` headers. The API has no
//! reverse blob index, and it can only delete a manifest together with every
//! tag on it, so tag deletion fails as unsupported. Registries which require a token
//! exchange need an OAuth credential holding a ready bearer token.

mod adapter;
mod client;

pub use self::adapter::{DistributionAdapter, DistributionFactory};

pub(crate) const DISTRIBUTION: &str = "docker-registry";
