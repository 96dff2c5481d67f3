use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the GitHub client.
#[derive(Debug, Error)]
pub enum GithubError {
    /// The remote refused the call because the request quota is exhausted.
    /// `retry_after` is GitHub's hint, or a default when it sent none.
    #[error("rate limited by GitHub, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// A response status the client has no mapping for.
    #[error("unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The response body did not match the expected wire schema.
    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Connection-level failure (DNS, TLS, timeout).
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// A repository reference that is not `owner/name`.
    #[error("invalid repository reference `{0}`")]
    InvalidRepo(String),
}

impl GithubError {
    /// Whether the call can be salvaged by assembling a partial result.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GithubError::RateLimited { .. })
    }
}
