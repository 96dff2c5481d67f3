use std::collections::BTreeMap;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Where a task definition was discovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceState {
    /// Merged into the repository's default branch.
    Committed,
    /// Proposed by an open, unmerged pull request.
    PendingPr,
}

/// Pull request metadata attached to a `PendingPr` task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrInfo {
    pub title: String,
    pub author: String,
    pub html_url: String,
}

/// One benchmark task definition, normalized from its source metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub benchmark: String,
    pub task_id: String,
    pub title: String,
    pub description: String,
    /// Sorted, deduplicated.
    pub tags: Vec<String>,
    pub source_state: SourceState,
    /// Present iff `source_state == PendingPr`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_info: Option<PrInfo>,
    /// Repository-relative directory the task was parsed from.
    pub path: String,
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Identity of a task within one snapshot.
pub(crate) type TaskKey = (String, String, SourceState, Option<u64>);

impl Task {
    pub(crate) fn key(&self) -> TaskKey {
        (
            self.benchmark.clone(),
            self.task_id.clone(),
            self.source_state,
            self.pr_number,
        )
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

/// One non-fatal failure recorded during a refresh.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestDiagnostic {
    pub benchmark: String,
    pub path: String,
    pub detail: String,
}

/// Immutable, versioned view of the whole catalog at one point in time.
///
/// Produced wholesale by a refresh and never mutated afterwards; shared
/// across readers behind an `Arc`. `committed` and `pending` are each
/// sorted by `(benchmark, task_id, pr_number)` so query output is stable.
#[derive(Clone, Debug, Serialize)]
pub struct CatalogSnapshot {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    /// Set when a rate limit or the refresh deadline cut ingestion short;
    /// the tasks that were collected are still valid.
    pub partial: bool,
    pub committed: Vec<Task>,
    pub pending: Vec<Task>,
    pub diagnostics: Vec<IngestDiagnostic>,
}

impl CatalogSnapshot {
    pub fn task_count(&self) -> usize {
        self.committed.len() + self.pending.len()
    }

    /// All tasks in slot order: committed first, then pending.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.committed.iter().chain(self.pending.iter())
    }

    pub(crate) fn task_at(&self, slot: usize) -> Option<&Task> {
        if slot < self.committed.len() {
            self.committed.get(slot)
        } else {
            self.pending.get(slot - self.committed.len())
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.built_at
    }
}

/// Snapshot identity surfaced alongside query results.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    pub version: u64,
    pub built_at: DateTime<Utc>,
    pub partial: bool,
}

impl From<&CatalogSnapshot> for SnapshotInfo {
    fn from(snapshot: &CatalogSnapshot) -> Self {
        Self {
            version: snapshot.version,
            built_at: snapshot.built_at,
            partial: snapshot.partial,
        }
    }
}

/// Aggregates for one benchmark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkStats {
    pub benchmark: String,
    pub task_count: usize,
    pub pending_pr_count: usize,
    pub tags: BTreeMap<String, usize>,
}

/// Catalog-wide aggregates, derived on demand from one snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub total_tasks: usize,
    pub pending_pr_tasks: usize,
    pub benchmarks: Vec<BenchmarkStats>,
    pub snapshot: SnapshotInfo,
}

/// Minimal committed task for unit tests across the crate.
#[cfg(test)]
pub(crate) fn sample_task(benchmark: &str, task_id: &str) -> Task {
    Task {
        benchmark: benchmark.to_string(),
        task_id: task_id.to_string(),
        title: String::new(),
        description: String::new(),
        tags: Vec::new(),
        source_state: SourceState::Committed,
        pr_number: None,
        pr_info: None,
        path: format!("tasks/{task_id}"),
        fetched_at: Utc::now(),
        author: None,
        difficulty: None,
        category: None,
    }
}
