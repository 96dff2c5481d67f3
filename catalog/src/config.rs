use std::time::Duration;

use taskhunt_github::RepoRef;

/// Metadata file convention a benchmark repository follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MetadataFormat {
    /// `task.toml` plus an optional sibling `instruction.md`.
    Toml,
    /// A single flat `task.yaml`.
    Yaml,
}

/// One benchmark repository the catalog tracks.
#[derive(Clone, Debug)]
pub struct BenchmarkSource {
    /// Catalog-facing benchmark id, e.g. `terminal-bench-2`.
    pub name: String,
    pub repo: RepoRef,
    pub branch: String,
    /// Repository-relative directory holding the task directories; empty
    /// when tasks live at the repository root.
    pub tasks_path: String,
    pub format: MetadataFormat,
}

impl BenchmarkSource {
    /// The repo-relative directory of one task within this benchmark.
    pub fn task_dir(&self, task_id: &str) -> String {
        if self.tasks_path.is_empty() {
            task_id.to_string()
        } else {
            format!("{}/{task_id}", self.tasks_path)
        }
    }
}

/// Tunables for the ingestion pipeline and cache.
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub benchmarks: Vec<BenchmarkSource>,
    /// Optional GitHub token. Absence is a supported configuration; it
    /// only lowers the request-rate ceiling.
    pub token: Option<String>,
    /// Snapshots older than this trigger a background refresh.
    pub cache_max_age: Duration,
    /// Upper bound on concurrent remote fetches during a refresh.
    pub worker_count: usize,
    /// A refresh running longer than this stops fetching and assembles a
    /// partial snapshot from what it collected.
    pub refresh_deadline: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            benchmarks: default_benchmarks(),
            token: None,
            cache_max_age: Duration::from_secs(300),
            worker_count: 8,
            refresh_deadline: Duration::from_secs(60),
        }
    }
}

impl CatalogConfig {
    /// Defaults overridden from the process environment: `GITHUB_TOKEN`,
    /// `TASKHUNT_CACHE_TTL_SECS`, `TASKHUNT_WORKERS`,
    /// `TASKHUNT_REFRESH_DEADLINE_SECS`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.token = std::env::var("GITHUB_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(secs) = env_u64("TASKHUNT_CACHE_TTL_SECS") {
            config.cache_max_age = Duration::from_secs(secs);
        }
        if let Some(workers) = env_u64("TASKHUNT_WORKERS") {
            config.worker_count = (workers as usize).max(1);
        }
        if let Some(secs) = env_u64("TASKHUNT_REFRESH_DEADLINE_SECS") {
            config.refresh_deadline = Duration::from_secs(secs.max(1));
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// The three Terminal Bench generations the service tracks out of the box.
fn default_benchmarks() -> Vec<BenchmarkSource> {
    vec![
        BenchmarkSource {
            name: "terminal-bench-1".to_string(),
            repo: RepoRef::new("laude-institute", "terminal-bench"),
            branch: "main".to_string(),
            tasks_path: "tasks".to_string(),
            format: MetadataFormat::Yaml,
        },
        BenchmarkSource {
            name: "terminal-bench-2".to_string(),
            repo: RepoRef::new("harbor-framework", "terminal-bench-2"),
            branch: "main".to_string(),
            tasks_path: String::new(),
            format: MetadataFormat::Toml,
        },
        BenchmarkSource {
            name: "terminal-bench-3".to_string(),
            repo: RepoRef::new("harbor-framework", "terminal-bench-3"),
            branch: "main".to_string(),
            tasks_path: "tasks".to_string(),
            format: MetadataFormat::Toml,
        },
    ]
}
