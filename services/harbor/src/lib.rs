//! Adapter for remote Harbor v2 registries.
//!
//! Harbor groups repositories into projects, the first segment of every
//! repository name. Listings walk projects, then their repositories, then
//! artifacts, and attach each project's metadata to its repositories.
//!
//! ```rust,no_run
//! use harbor::HarborAdapter;
//! use registry_adapter::{Adapter, AdapterOptions, CancellationToken};
//! use registry_model::{Filter, Registry, RegistryType};
//!
//! # async fn demo() -> Result<(), registry_adapter::AdapterError> {
//! let registry = Registry::new(RegistryType::Harbor, "https://harbor.example.com");
//! let adapter = HarborAdapter::new(&registry, AdapterOptions::default())?;
//! let resources = adapter
//!     .fetch_artifacts(&[Filter::name("library/*")], &CancellationToken::new())
//!     .await?;
//! # let _ = resources;
//! # Ok(())
//! # }
//! ```

mod adapter;
mod client;

pub use self::adapter::{HarborAdapter, HarborFactory};

pub(crate) const HARBOR: &str = "harbor";
