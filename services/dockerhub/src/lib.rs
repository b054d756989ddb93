//! Adapter for Docker Hub.
//!
//! Docker Hub only has two level repository names, `namespace/name`, and
//! pages its listings with a `next` URL in the response body. Basic
//! credentials are exchanged for a JWT before the first authenticated call,
//! and again when the token ages out or the hub rejects it.
//! Without credentials, listings must name the namespace to search in.

mod adapter;
mod client;

pub use self::adapter::{DockerHubAdapter, DockerHubFactory};

pub(crate) const DOCKER_HUB: &str = "docker-hub";
