use thiserror::Error;

/// Query-level and refresh-level catalog failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No task with the requested identity exists in the current snapshot.
    #[error("task `{task_id}` not found in benchmark `{benchmark}`")]
    NotFound { benchmark: String, task_id: String },

    /// No snapshot has ever been built; the catalog cannot answer yet.
    /// Observably different from an empty catalog.
    #[error("catalog unavailable: no snapshot has been built yet")]
    Unavailable,

    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// A refresh that produced nothing usable. Recoverable at the next
/// scheduled attempt; the cache keeps whatever snapshot it already holds.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Every enumeration call failed outright, so there is no basis for
    /// even a partial snapshot.
    #[error("catalog refresh failed: {detail}")]
    AllSourcesFailed { detail: String },
}
