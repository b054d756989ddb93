use std::time::Duration;

use serde::Deserialize;

use crate::error::{AdapterError, AdapterErrorKind};

/// Tuning shared by every adapter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Items requested per page from listing endpoints.
    pub page_size: usize,

    /// Pages followed before a listing fails with
    /// [AdapterErrorKind::PaginationLimitExceeded].
    pub max_pages: usize,

    /// Per-request timeout, in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: api_client::DEFAULT_MAX_PAGES,
            request_timeout_secs: None,
        }
    }
}

impl AdapterOptions {
    /// The per-request timeout, if any.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Reject options which would make every listing fail.
    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.page_size == 0 {
            return Err(AdapterError::new(
                "options",
                AdapterErrorKind::InvalidConfig,
                "page_size must be at least 1",
            ));
        }

        if self.max_pages == 0 {
            return Err(AdapterError::new(
                "options",
                AdapterErrorKind::InvalidConfig,
                "max_pages must be at least 1",
            ));
        }

        Ok(())
    }
}
