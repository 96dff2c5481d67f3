use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use taskhunt_github::SourceClient;

use crate::cache::CatalogCache;
use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::index::SearchIndex;
use crate::ingest::Ingestor;
use crate::model::BenchmarkStats;
use crate::model::CatalogSnapshot;
use crate::model::CatalogStats;
use crate::model::SnapshotInfo;
use crate::model::SourceState;
use crate::model::Task;

/// One snapshot plus the search index derived from it, installed and read
/// as a unit so no query ever sees a mixed-version pair.
#[derive(Debug)]
pub struct CatalogState {
    pub snapshot: Arc<CatalogSnapshot>,
    index: SearchIndex,
}

/// Predicates for [`Catalog::list`]; unset fields are no-ops and set
/// fields compose with AND.
#[derive(Clone, Debug, Default)]
pub struct TaskFilter {
    pub benchmark: Option<String>,
    pub tag: Option<String>,
    pub source_state: Option<SourceState>,
}

impl TaskFilter {
    fn matches(&self, task: &Task) -> bool {
        if let Some(benchmark) = &self.benchmark
            && task.benchmark != *benchmark
        {
            return false;
        }
        if let Some(tag) = &self.tag
            && !task.has_tag(tag)
        {
            return false;
        }
        if let Some(state) = self.source_state
            && task.source_state != state
        {
            return false;
        }
        true
    }
}

impl CatalogState {
    pub fn build(snapshot: CatalogSnapshot) -> Self {
        let snapshot = Arc::new(snapshot);
        let index = SearchIndex::build(&snapshot);
        Self { snapshot, index }
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo::from(&*self.snapshot)
    }

    /// Tasks matching `filter`, in the snapshot's stable order (committed
    /// before pending, each sorted by benchmark and task id).
    pub fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        self.snapshot
            .iter()
            .filter(|task| filter.matches(task))
            .cloned()
            .collect()
    }

    /// Relevance-ranked full-text matches. Empty queries return nothing.
    pub fn search(&self, text: &str) -> Vec<Task> {
        self.index
            .query(&self.snapshot, text)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The task with this identity. When the same pair exists both
    /// committed and behind open PRs, the committed variant wins; among
    /// PR variants the lowest PR number is the deterministic fallback.
    pub fn get(&self, benchmark: &str, task_id: &str) -> Option<&Task> {
        self.find_in(&self.snapshot.committed, benchmark, task_id)
            .or_else(|| self.find_in(&self.snapshot.pending, benchmark, task_id))
    }

    /// Like [`Self::get`] but pinned to one source state.
    pub fn get_with_state(
        &self,
        benchmark: &str,
        task_id: &str,
        state: SourceState,
    ) -> Option<&Task> {
        let pool = match state {
            SourceState::Committed => &self.snapshot.committed,
            SourceState::PendingPr => &self.snapshot.pending,
        };
        self.find_in(pool, benchmark, task_id)
    }

    fn find_in<'s>(&self, pool: &'s [Task], benchmark: &str, task_id: &str) -> Option<&'s Task> {
        pool.iter()
            .find(|task| task.benchmark == benchmark && task.task_id == task_id)
    }

    /// All candidate tasks proposed by open pull requests.
    pub fn pr_tasks(&self) -> Vec<Task> {
        self.snapshot.pending.to_vec()
    }

    /// Aggregates over the snapshot; computed on demand, never persisted.
    pub fn stats(&self) -> CatalogStats {
        let mut benchmarks: BTreeMap<String, BenchmarkStats> = BTreeMap::new();
        for task in self.snapshot.iter() {
            let entry = benchmarks
                .entry(task.benchmark.clone())
                .or_insert_with(|| BenchmarkStats {
                    benchmark: task.benchmark.clone(),
                    task_count: 0,
                    pending_pr_count: 0,
                    tags: BTreeMap::new(),
                });
            match task.source_state {
                SourceState::Committed => entry.task_count += 1,
                SourceState::PendingPr => entry.pending_pr_count += 1,
            }
            for tag in &task.tags {
                *entry.tags.entry(tag.clone()).or_default() += 1;
            }
        }
        CatalogStats {
            total_tasks: self.snapshot.task_count(),
            pending_pr_tasks: self.snapshot.pending.len(),
            benchmarks: benchmarks.into_values().collect(),
            snapshot: self.info(),
        }
    }
}

/// The public query engine.
///
/// Every operation reads one [`CatalogState`] obtained atomically at entry,
/// so a refresh completing mid-call never produces a mixed-version result.
/// The read path never performs network I/O.
#[derive(Clone)]
pub struct Catalog {
    cache: CatalogCache,
    max_age: Duration,
}

impl Catalog {
    pub fn new(source: Arc<dyn SourceClient>, config: CatalogConfig) -> Self {
        let max_age = config.cache_max_age;
        let cache = CatalogCache::new(Ingestor::new(source, Arc::new(config)));
        Self { cache, max_age }
    }

    /// The consistent read unit for compound callers (e.g. an HTTP layer
    /// that wants tasks plus snapshot identity from the same version).
    pub async fn state(&self) -> Result<Arc<CatalogState>, CatalogError> {
        self.cache.state().await
    }

    /// Run a refresh now (or join the in-flight one) and wait for it.
    pub async fn refresh(&self) -> Result<Arc<CatalogState>, CatalogError> {
        self.cache.refresh_now().await
    }

    /// Trigger a background refresh when the snapshot is older than the
    /// configured max age. Never blocks queries.
    pub async fn refresh_if_stale(&self) -> bool {
        self.cache.refresh_if_stale(self.max_age).await
    }

    pub async fn list(&self, filter: &TaskFilter) -> Result<Vec<Task>, CatalogError> {
        Ok(self.state().await?.list(filter))
    }

    pub async fn search(&self, text: &str) -> Result<Vec<Task>, CatalogError> {
        Ok(self.state().await?.search(text))
    }

    pub async fn get(&self, benchmark: &str, task_id: &str) -> Result<Task, CatalogError> {
        let state = self.state().await?;
        state
            .get(benchmark, task_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                benchmark: benchmark.to_string(),
                task_id: task_id.to_string(),
            })
    }

    pub async fn get_with_state(
        &self,
        benchmark: &str,
        task_id: &str,
        source_state: SourceState,
    ) -> Result<Task, CatalogError> {
        let state = self.state().await?;
        state
            .get_with_state(benchmark, task_id, source_state)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound {
                benchmark: benchmark.to_string(),
                task_id: task_id.to_string(),
            })
    }

    pub async fn pr_tasks(&self) -> Result<Vec<Task>, CatalogError> {
        Ok(self.state().await?.pr_tasks())
    }

    pub async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        Ok(self.state().await?.stats())
    }
}
