//! # Registry adapters
//!
//! The contract every remote registry adapter implements, and the pieces they
//! share: the [Adapter] trait, the [AdapterError] taxonomy, namespace and
//! filter matching, repository path encoding, descriptor validation, and the
//! [FactoryRegistry] which maps registry types to adapter constructors.

mod adapter;
mod codec;
mod error;
mod factory;
pub mod matcher;
mod options;
pub mod validate;

pub use adapter::{ensure_active, health_from, Adapter};
pub use codec::RepositoryCodec;
pub use error::{AdapterError, AdapterErrorBuilder, AdapterErrorKind};
pub use factory::{AdapterFactory, FactoryRegistry};
pub use matcher::{expand_wildcard_namespace, matches_all_filters, FilterSet};
pub use options::AdapterOptions;

#[doc(no_inline)]
pub use registry_model as model;
pub use tokio_util::sync::CancellationToken;
