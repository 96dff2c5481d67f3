use std::collections::BTreeSet;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use taskhunt_github::GithubError;
use taskhunt_github::PullRequestSummary;
use taskhunt_github::SourceClient;
use tokio::sync::Semaphore;
use tokio::sync::SemaphorePermit;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::config::BenchmarkSource;
use crate::config::CatalogConfig;
use crate::config::MetadataFormat;
use crate::error::IngestError;
use crate::model::CatalogSnapshot;
use crate::model::IngestDiagnostic;
use crate::model::PrInfo;
use crate::model::SourceState;
use crate::model::Task;
use crate::parser;

/// Drives one refresh cycle: enumerate benchmark roots and open PRs,
/// fetch and parse task metadata with bounded fan-out, and assemble an
/// immutable snapshot. Per-item failures become diagnostics; rate limits
/// and the refresh deadline downgrade the snapshot to partial instead of
/// discarding collected work.
pub struct Ingestor {
    source: Arc<dyn SourceClient>,
    config: Arc<CatalogConfig>,
}

/// Shared interrupt state for one refresh: the fetch budget (semaphore),
/// the wall-clock deadline, and whether a rate limit has been observed.
/// Once interrupted, remaining fetches short-circuit instead of piling
/// more calls onto an exhausted quota.
struct RefreshCtx {
    semaphore: Semaphore,
    deadline: Instant,
    limited: AtomicBool,
    deadline_hit: AtomicBool,
}

impl RefreshCtx {
    fn new(config: &CatalogConfig) -> Self {
        Self {
            semaphore: Semaphore::new(config.worker_count.max(1)),
            deadline: Instant::now() + config.refresh_deadline,
            limited: AtomicBool::new(false),
            deadline_hit: AtomicBool::new(false),
        }
    }

    fn interrupted(&self) -> bool {
        if self.limited.load(Ordering::Relaxed) {
            return true;
        }
        if Instant::now() >= self.deadline {
            self.deadline_hit.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }

    fn note_rate_limit(&self, retry_after: Duration) {
        if !self.limited.swap(true, Ordering::Relaxed) {
            warn!(
                ?retry_after,
                "rate limited mid-refresh, assembling partial snapshot"
            );
        }
    }

    fn cut_short(&self) -> bool {
        self.limited.load(Ordering::Relaxed) || self.deadline_hit.load(Ordering::Relaxed)
    }

    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        self.semaphore.acquire().await.ok()
    }
}

/// Accumulated results of one enumeration subtree.
#[derive(Default)]
struct Harvest {
    tasks: Vec<Task>,
    diagnostics: Vec<IngestDiagnostic>,
    enumerated: usize,
    partial: bool,
}

impl Harvest {
    fn absorb(&mut self, other: Harvest) {
        self.tasks.extend(other.tasks);
        self.diagnostics.extend(other.diagnostics);
        self.enumerated += other.enumerated;
        self.partial |= other.partial;
    }

    fn record(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Fetched(task) => self.tasks.push(*task),
            FetchOutcome::Failed(diagnostic) => self.diagnostics.push(diagnostic),
            FetchOutcome::Interrupted => self.partial = true,
            FetchOutcome::Absent => {}
        }
    }
}

enum FetchOutcome {
    Fetched(Box<Task>),
    Failed(IngestDiagnostic),
    /// Rate limit or deadline stopped this fetch before it completed.
    Interrupted,
    /// No metadata at the path. Normal for PR entries (a PR may delete a
    /// task), so not worth a diagnostic.
    Absent,
}

impl Ingestor {
    pub fn new(source: Arc<dyn SourceClient>, config: Arc<CatalogConfig>) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// Build a new snapshot stamped with `version`.
    pub async fn refresh(&self, version: u64) -> Result<CatalogSnapshot, IngestError> {
        let started = Instant::now();
        let ctx = RefreshCtx::new(&self.config);

        let mut committed = Harvest::default();
        for piece in join_all(
            self.config
                .benchmarks
                .iter()
                .map(|bench| self.collect_committed(bench, &ctx)),
        )
        .await
        {
            committed.absorb(piece);
        }

        let mut pending = Harvest::default();
        for piece in join_all(
            self.config
                .benchmarks
                .iter()
                .map(|bench| self.collect_pr_tasks(bench, &ctx)),
        )
        .await
        {
            pending.absorb(piece);
        }

        let enumerations = committed.enumerated + pending.enumerated;
        let partial = committed.partial || pending.partial || ctx.cut_short();
        let mut diagnostics = committed.diagnostics;
        diagnostics.extend(pending.diagnostics);

        if enumerations == 0 {
            return Err(IngestError::AllSourcesFailed {
                detail: failure_detail(&diagnostics, ctx.cut_short()),
            });
        }

        let mut committed_tasks = dedup_tasks(committed.tasks, &mut diagnostics);
        let mut pending_tasks = dedup_tasks(pending.tasks, &mut diagnostics);
        sort_tasks(&mut committed_tasks);
        sort_tasks(&mut pending_tasks);

        info!(
            version,
            committed = committed_tasks.len(),
            pending = pending_tasks.len(),
            diagnostics = diagnostics.len(),
            partial,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "assembled catalog snapshot"
        );

        Ok(CatalogSnapshot {
            version,
            built_at: Utc::now(),
            partial,
            committed: committed_tasks,
            pending: pending_tasks,
            diagnostics,
        })
    }

    /// Step 1: tasks merged into the benchmark's default branch.
    async fn collect_committed(&self, bench: &BenchmarkSource, ctx: &RefreshCtx) -> Harvest {
        let mut harvest = Harvest::default();
        if ctx.interrupted() {
            harvest.partial = true;
            return harvest;
        }
        let listing = {
            let Some(_permit) = ctx.permit().await else {
                harvest.partial = true;
                return harvest;
            };
            self.source
                .list_directories(&bench.repo, &bench.tasks_path, &bench.branch)
                .await
        };
        let page = match listing {
            Ok(page) => page,
            Err(GithubError::RateLimited { retry_after }) => {
                ctx.note_rate_limit(retry_after);
                harvest.partial = true;
                return harvest;
            }
            Err(err) => {
                warn!(benchmark = %bench.name, "task directory enumeration failed: {err}");
                harvest.diagnostics.push(IngestDiagnostic {
                    benchmark: bench.name.clone(),
                    path: bench.tasks_path.clone(),
                    detail: err.to_string(),
                });
                return harvest;
            }
        };
        harvest.enumerated += 1;
        harvest.partial |= page.partial;

        let dirs: Vec<_> = page.items.into_iter().filter(|entry| entry.is_dir()).collect();
        debug!(benchmark = %bench.name, dirs = dirs.len(), "enumerated task directories");
        let outcomes = join_all(dirs.iter().map(|entry| {
            self.fetch_task(bench, &entry.path, entry.name.clone(), &bench.branch, None, ctx)
        }))
        .await;
        for outcome in outcomes {
            harvest.record(outcome);
        }
        harvest
    }

    /// Step 2: candidate tasks proposed by open pull requests.
    async fn collect_pr_tasks(&self, bench: &BenchmarkSource, ctx: &RefreshCtx) -> Harvest {
        let mut harvest = Harvest::default();
        if ctx.interrupted() {
            harvest.partial = true;
            return harvest;
        }
        let listing = {
            let Some(_permit) = ctx.permit().await else {
                harvest.partial = true;
                return harvest;
            };
            self.source.list_open_pull_requests(&bench.repo).await
        };
        let page = match listing {
            Ok(page) => page,
            Err(GithubError::RateLimited { retry_after }) => {
                ctx.note_rate_limit(retry_after);
                harvest.partial = true;
                return harvest;
            }
            Err(err) => {
                warn!(benchmark = %bench.name, "pull request enumeration failed: {err}");
                harvest.diagnostics.push(IngestDiagnostic {
                    benchmark: bench.name.clone(),
                    path: String::new(),
                    detail: format!("pull request listing failed: {err}"),
                });
                return harvest;
            }
        };
        harvest.enumerated += 1;
        harvest.partial |= page.partial;

        let outcomes = join_all(
            page.items
                .iter()
                .map(|pr| self.collect_tasks_from_pr(bench, pr, ctx)),
        )
        .await;
        for piece in outcomes {
            harvest.absorb(piece);
        }
        harvest
    }

    async fn collect_tasks_from_pr(
        &self,
        bench: &BenchmarkSource,
        pr: &PullRequestSummary,
        ctx: &RefreshCtx,
    ) -> Harvest {
        let mut harvest = Harvest::default();
        if ctx.interrupted() {
            harvest.partial = true;
            return harvest;
        }
        let listing = {
            let Some(_permit) = ctx.permit().await else {
                harvest.partial = true;
                return harvest;
            };
            self.source.list_changed_paths(&bench.repo, pr.number).await
        };
        let page = match listing {
            Ok(page) => page,
            Err(GithubError::RateLimited { retry_after }) => {
                ctx.note_rate_limit(retry_after);
                harvest.partial = true;
                return harvest;
            }
            Err(err) => {
                harvest.diagnostics.push(IngestDiagnostic {
                    benchmark: bench.name.clone(),
                    path: String::new(),
                    detail: format!("changed paths for PR #{} failed: {err}", pr.number),
                });
                return harvest;
            }
        };
        harvest.partial |= page.partial;

        let task_ids = task_ids_from_paths(&bench.tasks_path, &page.items);
        if task_ids.is_empty() {
            return harvest;
        }
        debug!(
            benchmark = %bench.name,
            pr = pr.number,
            tasks = task_ids.len(),
            "pull request touches task directories"
        );
        let task_dirs: Vec<String> = task_ids.iter().map(|id| bench.task_dir(id)).collect();
        let outcomes = join_all(task_ids.iter().zip(&task_dirs).map(|(task_id, dir_path)| {
            self.fetch_task(
                bench,
                dir_path,
                task_id.clone(),
                &pr.head_ref,
                Some(pr),
                ctx,
            )
        }))
        .await;
        for outcome in outcomes {
            harvest.record(outcome);
        }
        harvest
    }

    /// Fetch and parse one task directory's metadata at `git_ref`. For PR
    /// entries the ref is the PR head, so proposed content wins over
    /// whatever is committed at the same path.
    async fn fetch_task(
        &self,
        bench: &BenchmarkSource,
        dir_path: &str,
        task_id: String,
        git_ref: &str,
        pr: Option<&PullRequestSummary>,
        ctx: &RefreshCtx,
    ) -> FetchOutcome {
        let Some(_permit) = ctx.permit().await else {
            return FetchOutcome::Interrupted;
        };
        if ctx.interrupted() {
            return FetchOutcome::Interrupted;
        }

        let meta = match bench.format {
            MetadataFormat::Toml => {
                let meta_path = format!("{dir_path}/task.toml");
                let instruction_path = format!("{dir_path}/instruction.md");
                let (raw, instruction) = tokio::join!(
                    self.source.read_file(&bench.repo, &meta_path, git_ref),
                    self.source.read_file(&bench.repo, &instruction_path, git_ref),
                );
                let raw = match classify_read(bench, &meta_path, raw, pr, ctx) {
                    Ok(raw) => raw,
                    Err(outcome) => return outcome,
                };
                let instruction = match instruction {
                    Ok(contents) => contents,
                    Err(GithubError::RateLimited { retry_after }) => {
                        ctx.note_rate_limit(retry_after);
                        None
                    }
                    Err(err) => {
                        debug!(path = %instruction_path, "instruction fetch failed: {err}");
                        None
                    }
                };
                parser::parse_toml(&meta_path, &raw, instruction.as_deref())
            }
            MetadataFormat::Yaml => {
                let meta_path = format!("{dir_path}/task.yaml");
                let raw = self.source.read_file(&bench.repo, &meta_path, git_ref).await;
                let raw = match classify_read(bench, &meta_path, raw, pr, ctx) {
                    Ok(raw) => raw,
                    Err(outcome) => return outcome,
                };
                parser::parse_yaml(&meta_path, &raw)
            }
        };

        match meta {
            Ok(meta) => FetchOutcome::Fetched(Box::new(build_task(
                bench, task_id, dir_path, meta, pr,
            ))),
            Err(err) => {
                warn!(benchmark = %bench.name, "skipping malformed task: {err}");
                FetchOutcome::Failed(IngestDiagnostic {
                    benchmark: bench.name.clone(),
                    path: err.path.clone(),
                    detail: err.reason,
                })
            }
        }
    }
}

/// Sort a metadata read into contents / absent / interrupted / failed.
fn classify_read(
    bench: &BenchmarkSource,
    meta_path: &str,
    read: Result<Option<String>, GithubError>,
    pr: Option<&PullRequestSummary>,
    ctx: &RefreshCtx,
) -> Result<String, FetchOutcome> {
    match read {
        Ok(Some(raw)) => Ok(raw),
        Ok(None) if pr.is_some() => Err(FetchOutcome::Absent),
        Ok(None) => Err(FetchOutcome::Failed(IngestDiagnostic {
            benchmark: bench.name.clone(),
            path: meta_path.to_string(),
            detail: "metadata file missing".to_string(),
        })),
        Err(GithubError::RateLimited { retry_after }) => {
            ctx.note_rate_limit(retry_after);
            Err(FetchOutcome::Interrupted)
        }
        Err(err) => Err(FetchOutcome::Failed(IngestDiagnostic {
            benchmark: bench.name.clone(),
            path: meta_path.to_string(),
            detail: err.to_string(),
        })),
    }
}

fn build_task(
    bench: &BenchmarkSource,
    task_id: String,
    dir_path: &str,
    meta: parser::TaskMeta,
    pr: Option<&PullRequestSummary>,
) -> Task {
    let (source_state, pr_number, pr_info) = match pr {
        Some(pr) => (
            SourceState::PendingPr,
            Some(pr.number),
            Some(PrInfo {
                title: pr.title.clone(),
                author: pr.author.clone(),
                html_url: pr.html_url.clone(),
            }),
        ),
        None => (SourceState::Committed, None, None),
    };
    Task {
        benchmark: bench.name.clone(),
        task_id,
        title: meta.title,
        description: meta.description,
        tags: meta.tags,
        source_state,
        pr_number,
        pr_info,
        path: dir_path.to_string(),
        fetched_at: Utc::now(),
        author: meta.author,
        difficulty: meta.difficulty,
        category: meta.category,
    }
}

/// Task directories a PR touches: the first path component below the
/// benchmark root, for paths that actually sit inside a directory.
fn task_ids_from_paths(tasks_path: &str, changed: &[String]) -> BTreeSet<String> {
    let prefix = if tasks_path.is_empty() {
        String::new()
    } else {
        format!("{tasks_path}/")
    };
    let mut ids = BTreeSet::new();
    for path in changed {
        let Some(relative) = path.strip_prefix(&prefix) else {
            continue;
        };
        let mut parts = relative.split('/');
        if let (Some(first), Some(_rest)) = (parts.next(), parts.next())
            && !first.is_empty()
        {
            ids.insert(first.to_string());
        }
    }
    ids
}

fn dedup_tasks(tasks: Vec<Task>, diagnostics: &mut Vec<IngestDiagnostic>) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(tasks.len());
    for task in tasks {
        if seen.insert(task.key()) {
            unique.push(task);
        } else {
            diagnostics.push(IngestDiagnostic {
                benchmark: task.benchmark.clone(),
                path: task.path.clone(),
                detail: format!("duplicate task identity `{}` skipped", task.task_id),
            });
        }
    }
    unique
}

fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.benchmark
            .cmp(&b.benchmark)
            .then_with(|| a.task_id.cmp(&b.task_id))
            .then_with(|| a.pr_number.cmp(&b.pr_number))
    });
}

fn failure_detail(diagnostics: &[IngestDiagnostic], cut_short: bool) -> String {
    if let Some(first) = diagnostics.first() {
        let mut detail = format!("{} ({})", first.detail, first.benchmark);
        if diagnostics.len() > 1 {
            detail.push_str(&format!(" and {} more", diagnostics.len() - 1));
        }
        detail
    } else if cut_short {
        "rate limited or deadline hit before any enumeration completed".to_string()
    } else {
        "no benchmark sources configured".to_string()
    }
}
