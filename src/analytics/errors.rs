//! Analytics provider and cache error types.
//!
//! None of these are fatal to a chat request. The pipeline logs them and
//! degrades to "no data"; `ProviderError::category_message` is the only text
//! that ever reaches the model.

use thiserror::Error;

/// Errors returned by the GA4 / Search Console providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials or the property / site identifier are missing.
    #[error("analytics provider not configured: {reason}")]
    NotConfigured { reason: String },

    /// TCP/HTTP connection to the provider failed.
    #[error("network error calling {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// HTTP 401/403.
    #[error("permission denied: {body}")]
    PermissionDenied { body: String },

    /// HTTP 404, usually an unknown property or site.
    #[error("not found: {body}")]
    NotFound { body: String },

    #[error("provider timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// The provider answered 2xx but the payload did not have the expected shape.
    #[error("invalid provider response: {reason}")]
    InvalidResponse { reason: String },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl ProviderError {
    /// Short category message embedded in the flexible-results block.
    pub fn category_message(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured { .. } => "analytics is not connected",
            ProviderError::Network { .. } | ProviderError::Timeout { .. } => {
                "the analytics service could not be reached"
            }
            ProviderError::PermissionDenied { .. } => {
                "no permission to read this analytics property"
            }
            ProviderError::NotFound { .. } => "the analytics property was not found",
            ProviderError::InvalidResponse { .. } | ProviderError::Http { .. } => {
                "the analytics service returned an error"
            }
        }
    }

    /// Map an HTTP status + body into the matching variant.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => ProviderError::PermissionDenied { body },
            404 => ProviderError::NotFound { body },
            _ => ProviderError::Http { status, body },
        }
    }

    /// Map a transport-level `reqwest` failure.
    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout {
                duration_secs: timeout_secs,
            }
        } else if err.is_decode() {
            ProviderError::InvalidResponse {
                reason: err.to_string(),
            }
        } else {
            ProviderError::Network {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Errors from a cache backend. Always treated as a miss or a skipped write.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache storage error: {reason}")]
    Storage { reason: String },

    #[error("cache serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<rusqlite::Error> for CacheError {
    fn from(e: rusqlite::Error) -> Self {
        CacheError::Storage {
            reason: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization {
            reason: e.to_string(),
        }
    }
}
