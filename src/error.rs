//! Error types for the operator
//!
//! A single crate-wide error enum. Variants split along the retry boundary:
//! `InvalidConfig` needs a human, everything else is safe to requeue.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[source] kube::Error),

    /// Credentials or account scope are incomplete. Retrying without a
    /// config change cannot succeed.
    #[error("invalid Cloudflare configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to initialize Cloudflare client: {0}")]
    ClientInit(String),

    /// Transient Cloudflare API failure; the whole pass is safe to re-run.
    #[error("Cloudflare API error: {0}")]
    UpstreamError(String),

    /// An Access group id we previously recorded no longer exists upstream.
    #[error("Access group not found: {0}")]
    GroupNotFound(String),

    /// Create hit a same-named group; should not happen after the listing
    /// scan, surfaced so the next pass can adopt it.
    #[error("Access group conflict: {0}")]
    GroupConflict(String),

    #[error("HTTP transport error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Whether a requeue can plausibly fix this error without human action.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Error::InvalidConfig(_))
    }
}
