//! HTTP implementations of the outbound ports.

pub mod compensation;
pub mod invoker;
pub mod publisher;

use thiserror::Error;

pub use compensation::{HttpCompensationAdapter, HttpCompensationConfig};
pub use invoker::{HttpActionInvoker, HttpInvokerConfig};
pub use publisher::{HttpEventPublisher, HttpPublisherConfig};

/// Errors building a remote adapter.
#[derive(Debug, Error)]
pub enum RemoteConfigError {
    /// A required setting is missing.
    #[error("{0} not set")]
    Missing(&'static str),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Reads a required environment variable.
fn required_env(name: &'static str) -> Result<String, RemoteConfigError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or(RemoteConfigError::Missing(name))
}

/// Reads an optional numeric environment variable.
fn numeric_env(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// Truncates a response body for logs and error messages.
fn excerpt(body: &str) -> String {
    body.chars().take(200).collect()
}
