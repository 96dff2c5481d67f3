use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use taskhunt_github::DirEntry;
use taskhunt_github::EntryKind;
use taskhunt_github::GithubError;
use taskhunt_github::Page;
use taskhunt_github::PullRequestSummary;
use taskhunt_github::RepoRef;
use taskhunt_github::SourceClient;

/// In-memory stand-in for one GitHub repository: directory listings and
/// file contents keyed by `(git_ref, path)`, plus scripted failures.
#[derive(Default)]
pub struct ScriptedSource {
    state: Mutex<ScriptedState>,
}

#[derive(Default)]
struct ScriptedState {
    dirs: HashMap<(String, String), Vec<DirEntry>>,
    files: HashMap<(String, String), String>,
    pulls: Vec<PullRequestSummary>,
    pr_files: HashMap<u64, Vec<String>>,
    rate_limit_pr_listing: bool,
    fail_everything: bool,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dir_entry(&self, git_ref: &str, parent: &str, name: &str, kind: EntryKind) {
        let path = if parent.is_empty() {
            name.to_string()
        } else {
            format!("{parent}/{name}")
        };
        let mut state = self.state.lock().unwrap();
        state
            .dirs
            .entry((git_ref.to_string(), parent.to_string()))
            .or_default()
            .push(DirEntry {
                name: name.to_string(),
                path,
                kind,
            });
    }

    pub fn add_file(&self, git_ref: &str, path: &str, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .insert((git_ref.to_string(), path.to_string()), contents.to_string());
    }

    /// A committed task directory plus its `task.toml` on `main`.
    pub fn add_committed_toml(&self, tasks_path: &str, task_id: &str, toml: &str) {
        self.add_dir_entry("main", tasks_path, task_id, EntryKind::Dir);
        let dir = if tasks_path.is_empty() {
            task_id.to_string()
        } else {
            format!("{tasks_path}/{task_id}")
        };
        self.add_file("main", &format!("{dir}/task.toml"), toml);
    }

    pub fn add_pull_request(&self, number: u64, head_ref: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        state.pulls.push(PullRequestSummary {
            number,
            title: title.to_string(),
            author: "octocat".to_string(),
            head_ref: head_ref.to_string(),
            html_url: format!("https://example.invalid/pull/{number}"),
            updated_at: None,
        });
    }

    pub fn add_pr_file(&self, number: u64, path: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .pr_files
            .entry(number)
            .or_default()
            .push(path.to_string());
    }

    pub fn rate_limit_pr_listing(&self) {
        self.state.lock().unwrap().rate_limit_pr_listing = true;
    }

    pub fn fail_everything(&self) {
        self.state.lock().unwrap().fail_everything = true;
    }

    fn refuse_all(&self) -> bool {
        self.state.lock().unwrap().fail_everything
    }
}

fn hard_failure(url: &str) -> GithubError {
    GithubError::UnexpectedStatus {
        status: 500,
        url: url.to_string(),
    }
}

#[async_trait]
impl SourceClient for ScriptedSource {
    async fn list_directories(
        &self,
        _repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Page<DirEntry>, GithubError> {
        if self.refuse_all() {
            return Err(hard_failure(path));
        }
        let state = self.state.lock().unwrap();
        let entries = state
            .dirs
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(Page::complete(entries))
    }

    async fn read_file(
        &self,
        _repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError> {
        if self.refuse_all() {
            return Err(hard_failure(path));
        }
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(&(git_ref.to_string(), path.to_string()))
            .cloned())
    }

    async fn list_open_pull_requests(
        &self,
        _repo: &RepoRef,
    ) -> Result<Page<PullRequestSummary>, GithubError> {
        if self.refuse_all() {
            return Err(hard_failure("pulls"));
        }
        let state = self.state.lock().unwrap();
        if state.rate_limit_pr_listing {
            return Err(GithubError::RateLimited {
                retry_after: std::time::Duration::from_secs(60),
            });
        }
        Ok(Page::complete(state.pulls.clone()))
    }

    async fn list_changed_paths(
        &self,
        _repo: &RepoRef,
        pr_number: u64,
    ) -> Result<Page<String>, GithubError> {
        if self.refuse_all() {
            return Err(hard_failure("pull files"));
        }
        let state = self.state.lock().unwrap();
        Ok(Page::complete(
            state.pr_files.get(&pr_number).cloned().unwrap_or_default(),
        ))
    }
}
