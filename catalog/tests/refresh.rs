mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::ScriptedSource;
use pretty_assertions::assert_eq;
use taskhunt_catalog::BenchmarkSource;
use taskhunt_catalog::Catalog;
use taskhunt_catalog::CatalogConfig;
use taskhunt_catalog::CatalogError;
use taskhunt_catalog::MetadataFormat;
use taskhunt_catalog::SourceState;
use taskhunt_catalog::TaskFilter;
use taskhunt_github::RepoRef;

fn toml_benchmark() -> BenchmarkSource {
    BenchmarkSource {
        name: "terminal-bench-3".to_string(),
        repo: RepoRef::new("harbor-framework", "terminal-bench-3"),
        branch: "main".to_string(),
        tasks_path: "tasks".to_string(),
        format: MetadataFormat::Toml,
    }
}

fn config_with(benchmarks: Vec<BenchmarkSource>) -> CatalogConfig {
    CatalogConfig {
        benchmarks,
        token: None,
        cache_max_age: Duration::from_secs(300),
        worker_count: 4,
        refresh_deadline: Duration::from_secs(30),
    }
}

fn catalog_over(source: ScriptedSource, benchmarks: Vec<BenchmarkSource>) -> Catalog {
    Catalog::new(Arc::new(source), config_with(benchmarks))
}

const FIX_AUTH_TOML: &str = r#"
[task]
title = "Authentication Flow"
description = "Harden the login path."
tags = ["auth", "security"]

[metadata]
author_name = "Ada"
difficulty = "hard"
category = "web"
"#;

const PORT_SCAN_TOML: &str = r#"
[task]
title = "Port scanner"
tags = ["network"]
"#;

#[tokio::test]
async fn refresh_collects_committed_and_pr_tasks() {
    let source = ScriptedSource::new();
    source.add_committed_toml("tasks", "fix-auth", FIX_AUTH_TOML);
    source.add_committed_toml("tasks", "port-scan", PORT_SCAN_TOML);
    source.add_file("main", "tasks/port-scan/instruction.md", "Scan the subnet.");

    source.add_pull_request(7, "feature/auth-v2", "Rework the auth task");
    source.add_pr_file(7, "tasks/fix-auth/task.toml");
    source.add_pr_file(7, "tasks/new-task/task.toml");
    source.add_file(
        "feature/auth-v2",
        "tasks/fix-auth/task.toml",
        "[task]\ntitle = \"Authentication Flow v2\"\n",
    );
    source.add_file(
        "feature/auth-v2",
        "tasks/new-task/task.toml",
        "[task]\ntitle = \"Brand new\"\n",
    );

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    let state = catalog.refresh().await.expect("refresh");
    let snapshot = &state.snapshot;

    assert!(!snapshot.partial);
    assert_eq!(snapshot.version, 1);

    let committed_ids: Vec<&str> = snapshot
        .committed
        .iter()
        .map(|task| task.task_id.as_str())
        .collect();
    assert_eq!(committed_ids, vec!["fix-auth", "port-scan"]);
    assert_eq!(snapshot.committed[0].title, "Authentication Flow");
    assert_eq!(snapshot.committed[0].tags, vec!["auth", "security"]);
    assert_eq!(snapshot.committed[0].author.as_deref(), Some("Ada"));
    assert_eq!(snapshot.committed[1].description, "Scan the subnet.");

    let pending_ids: Vec<&str> = snapshot
        .pending
        .iter()
        .map(|task| task.task_id.as_str())
        .collect();
    assert_eq!(pending_ids, vec!["fix-auth", "new-task"]);
    for task in &snapshot.pending {
        assert_eq!(task.source_state, SourceState::PendingPr);
        assert_eq!(task.pr_number, Some(7));
        let info = task.pr_info.as_ref().expect("pr info");
        assert_eq!(info.author, "octocat");
    }
    // PR content wins over the committed version for the PR entry.
    assert_eq!(snapshot.pending[0].title, "Authentication Flow v2");

    // Identity is unique across the whole snapshot even though `fix-auth`
    // appears under both source states.
    let keys: HashSet<_> = snapshot
        .iter()
        .map(|task| {
            (
                task.benchmark.clone(),
                task.task_id.clone(),
                task.source_state,
                task.pr_number,
            )
        })
        .collect();
    assert_eq!(keys.len(), snapshot.task_count());

    // The committed variant wins an unpinned get.
    let task = catalog
        .get("terminal-bench-3", "fix-auth")
        .await
        .expect("get");
    assert_eq!(task.source_state, SourceState::Committed);
    assert_eq!(task.title, "Authentication Flow");
}

#[tokio::test]
async fn yaml_benchmark_parses_flat_metadata() {
    let source = ScriptedSource::new();
    source.add_dir_entry("main", "tasks", "flaky-test", taskhunt_github::EntryKind::Dir);
    source.add_file(
        "main",
        "tasks/flaky-test/task.yaml",
        "instruction: Fix the flaky test.\ntags: [ci]\nauthor_name: Grace\ndifficulty: easy\n",
    );

    let bench = BenchmarkSource {
        name: "terminal-bench-1".to_string(),
        repo: RepoRef::new("laude-institute", "terminal-bench"),
        branch: "main".to_string(),
        tasks_path: "tasks".to_string(),
        format: MetadataFormat::Yaml,
    };
    let catalog = catalog_over(source, vec![bench]);
    let state = catalog.refresh().await.expect("refresh");

    assert_eq!(state.snapshot.committed.len(), 1);
    let task = &state.snapshot.committed[0];
    assert_eq!(task.description, "Fix the flaky test.");
    assert_eq!(task.tags, vec!["ci"]);
    assert_eq!(task.difficulty.as_deref(), Some("easy"));
}

#[tokio::test]
async fn malformed_metadata_is_skipped_not_fatal() {
    let source = ScriptedSource::new();
    source.add_committed_toml("tasks", "good-task", PORT_SCAN_TOML);
    source.add_committed_toml("tasks", "bad-task", "title = [unclosed");

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    let state = catalog.refresh().await.expect("refresh survives bad task");
    let snapshot = &state.snapshot;

    assert_eq!(snapshot.committed.len(), 1);
    assert_eq!(snapshot.committed[0].task_id, "good-task");
    assert_eq!(snapshot.diagnostics.len(), 1);
    assert!(snapshot.diagnostics[0].path.contains("bad-task"));
    assert!(!snapshot.partial);
}

#[tokio::test]
async fn missing_committed_metadata_is_diagnosed() {
    let source = ScriptedSource::new();
    source.add_dir_entry("main", "tasks", "hollow", taskhunt_github::EntryKind::Dir);

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    let state = catalog.refresh().await.expect("refresh");

    assert!(state.snapshot.committed.is_empty());
    assert_eq!(state.snapshot.diagnostics.len(), 1);
    assert!(state.snapshot.diagnostics[0].detail.contains("missing"));
}

#[tokio::test]
async fn rate_limited_pr_enumeration_yields_partial_snapshot_with_committed_tasks() {
    let source = ScriptedSource::new();
    source.add_committed_toml("tasks", "fix-auth", FIX_AUTH_TOML);
    source.add_committed_toml("tasks", "port-scan", PORT_SCAN_TOML);
    source.rate_limit_pr_listing();

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    let state = catalog.refresh().await.expect("partial refresh succeeds");
    let snapshot = &state.snapshot;

    assert!(snapshot.partial);
    assert_eq!(snapshot.committed.len(), 2);
    assert!(snapshot.pending.is_empty());
}

#[tokio::test]
async fn total_failure_on_a_fresh_cache_is_ingestion_failed() {
    let source = ScriptedSource::new();
    source.fail_everything();

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    let err = catalog.refresh().await.expect_err("nothing enumerable");
    assert!(matches!(err, CatalogError::Ingest(_)));

    // No snapshot was installed, so queries surface unavailability rather
    // than an empty catalog.
    let err = catalog.list(&TaskFilter::default()).await.expect_err("no snapshot");
    assert!(matches!(err, CatalogError::Unavailable));
}

#[tokio::test]
async fn expired_deadline_with_no_prior_work_is_ingestion_failed() {
    let source = ScriptedSource::new();
    source.add_committed_toml("tasks", "fix-auth", FIX_AUTH_TOML);

    let mut config = config_with(vec![toml_benchmark()]);
    config.refresh_deadline = Duration::ZERO;
    let catalog = Catalog::new(Arc::new(source), config);

    let err = catalog.refresh().await.expect_err("deadline before any call");
    assert!(matches!(err, CatalogError::Ingest(_)));
}

#[tokio::test]
async fn benchmarks_at_the_repository_root_are_supported() {
    let source = ScriptedSource::new();
    source.add_committed_toml("", "fix-auth", FIX_AUTH_TOML);

    let bench = BenchmarkSource {
        name: "terminal-bench-2".to_string(),
        repo: RepoRef::new("harbor-framework", "terminal-bench-2"),
        branch: "main".to_string(),
        tasks_path: String::new(),
        format: MetadataFormat::Toml,
    };
    let catalog = catalog_over(source, vec![bench]);
    let state = catalog.refresh().await.expect("refresh");

    assert_eq!(state.snapshot.committed.len(), 1);
    assert_eq!(state.snapshot.committed[0].path, "fix-auth");
}

#[tokio::test]
async fn list_filters_and_search_read_the_refreshed_snapshot() {
    let source = ScriptedSource::new();
    source.add_committed_toml("tasks", "fix-auth", FIX_AUTH_TOML);
    source.add_committed_toml("tasks", "port-scan", PORT_SCAN_TOML);

    let catalog = catalog_over(source, vec![toml_benchmark()]);
    catalog.refresh().await.expect("refresh");

    let security = catalog
        .list(&TaskFilter {
            benchmark: Some("terminal-bench-3".to_string()),
            tag: Some("security".to_string()),
            source_state: None,
        })
        .await
        .expect("list");
    assert_eq!(security.len(), 1);
    assert_eq!(security[0].task_id, "fix-auth");

    let hits = catalog.search("auth").await.expect("search");
    assert_eq!(hits[0].task_id, "fix-auth");
    assert!(catalog.search("").await.expect("empty search").is_empty());

    let stats = catalog.stats().await.expect("stats");
    assert_eq!(stats.total_tasks, 2);
    assert_eq!(stats.pending_pr_tasks, 0);
}
