//! GitHub access for the task catalog.
//!
//! The [`SourceClient`] trait is the seam the ingestion pipeline consumes:
//! directory listings, file contents, and open-PR metadata for one
//! repository. [`GithubClient`] is the REST v3 implementation. Rate-limit
//! responses are surfaced as [`GithubError::RateLimited`] and never retried
//! here; retry policy belongs to the caller.

mod client;
mod error;
mod types;

pub use client::GithubClient;
pub use error::GithubError;
pub use types::DirEntry;
pub use types::EntryKind;
pub use types::Page;
pub use types::PullRequestSummary;
pub use types::RepoRef;

use async_trait::async_trait;

/// Read-only view of one hosted repository.
///
/// All listings are exhaustive unless a rate limit interrupted the page
/// walk, in which case the returned [`Page`] carries `partial = true` with
/// whatever was collected before the interruption.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// List the entries directly under `path` at `git_ref`. A missing
    /// directory yields an empty page, not an error.
    async fn list_directories(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Page<DirEntry>, GithubError>;

    /// Fetch one file's decoded contents at `git_ref`. `Ok(None)` when the
    /// file does not exist at that ref.
    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError>;

    /// List the repository's open pull requests.
    async fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> Result<Page<PullRequestSummary>, GithubError>;

    /// List every path touched by the given pull request.
    async fn list_changed_paths(
        &self,
        repo: &RepoRef,
        pr_number: u64,
    ) -> Result<Page<String>, GithubError>;
}
