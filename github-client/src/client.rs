use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use tracing::warn;

use crate::SourceClient;
use crate::error::GithubError;
use crate::types::DirEntry;
use crate::types::EntryKind;
use crate::types::Page;
use crate::types::PullRequestSummary;
use crate::types::RepoRef;

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("taskhunt/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
const PER_PAGE: usize = 100;

/// GitHub REST v3 implementation of [`SourceClient`].
///
/// Works with or without a token; unauthenticated calls run against the
/// lower anonymous quota. The base URL is injectable so tests can target a
/// local mock server.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(token: Option<String>) -> Result<Self, GithubError> {
        Self::with_base_url(token, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(
        token: Option<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|value| !value.trim().is_empty()),
        })
    }

    /// GET a JSON document. `Ok(None)` on 404; rate-limit statuses become
    /// [`GithubError::RateLimited`].
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, GithubError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%url, "github request");
        let mut request = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status.as_u16() == 404 {
            return Ok(None);
        }
        if let Some(retry_after) = rate_limit_hint(&response) {
            return Err(GithubError::RateLimited { retry_after });
        }
        if !status.is_success() {
            return Err(GithubError::UnexpectedStatus {
                status: status.as_u16(),
                url,
            });
        }
        let value = response
            .json::<T>()
            .await
            .map_err(|err| GithubError::Decode {
                url,
                reason: err.to_string(),
            })?;
        Ok(Some(value))
    }

    /// Walk a paginated listing endpoint to exhaustion. A rate limit after
    /// at least one page was collected downgrades to a partial page; a rate
    /// limit before anything was collected propagates.
    async fn get_paged<W, T>(
        &self,
        path: &str,
        extra_query: &[(&str, &str)],
        map: impl Fn(W) -> T,
    ) -> Result<Page<T>, GithubError>
    where
        W: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page = 1u32;
        loop {
            let per_page = PER_PAGE.to_string();
            let page_number = page.to_string();
            let mut query = vec![
                ("per_page", per_page.as_str()),
                ("page", page_number.as_str()),
            ];
            query.extend_from_slice(extra_query);
            match self.get_json::<Vec<W>>(path, &query).await {
                Ok(None) => return Ok(Page::complete(items)),
                Ok(Some(batch)) => {
                    let batch_len = batch.len();
                    items.extend(batch.into_iter().map(&map));
                    if batch_len < PER_PAGE {
                        return Ok(Page::complete(items));
                    }
                    page += 1;
                }
                Err(err) if err.is_rate_limit() && !items.is_empty() => {
                    warn!(path, collected = items.len(), "pagination cut short: {err}");
                    return Ok(Page::truncated(items));
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn contents_path(repo: &RepoRef, path: &str) -> String {
        let base = format!(
            "/repos/{}/{}/contents",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        );
        if path.is_empty() {
            base
        } else {
            format!("{base}/{}", encode_repo_path(path))
        }
    }
}

#[async_trait]
impl SourceClient for GithubClient {
    async fn list_directories(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Page<DirEntry>, GithubError> {
        let route = Self::contents_path(repo, path);
        let entries: Option<Vec<ContentEntryWire>> =
            self.get_json(&route, &[("ref", git_ref)]).await?;
        let Some(entries) = entries else {
            return Ok(Page::empty());
        };
        Ok(Page::complete(
            entries.into_iter().map(ContentEntryWire::into_entry).collect(),
        ))
    }

    async fn read_file(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> Result<Option<String>, GithubError> {
        let route = Self::contents_path(repo, path);
        let file: Option<FileContentWire> = self.get_json(&route, &[("ref", git_ref)]).await?;
        let Some(file) = file else {
            return Ok(None);
        };
        file.decode(&route).map(Some)
    }

    async fn list_open_pull_requests(
        &self,
        repo: &RepoRef,
    ) -> Result<Page<PullRequestSummary>, GithubError> {
        let route = format!(
            "/repos/{}/{}/pulls",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        );
        self.get_paged(&route, &[("state", "open")], PullWire::into_summary)
            .await
    }

    async fn list_changed_paths(
        &self,
        repo: &RepoRef,
        pr_number: u64,
    ) -> Result<Page<String>, GithubError> {
        let route = format!(
            "/repos/{}/{}/pulls/{pr_number}/files",
            urlencoding::encode(&repo.owner),
            urlencoding::encode(&repo.name)
        );
        self.get_paged(&route, &[], |file: PullFileWire| file.filename)
            .await
    }
}

/// Retry-after hint when the response is a quota refusal, `None` otherwise.
///
/// GitHub signals primary-quota exhaustion as 403 with
/// `x-ratelimit-remaining: 0` and secondary throttles as 429 or a
/// `retry-after` header.
fn rate_limit_hint(response: &reqwest::Response) -> Option<Duration> {
    let status = response.status().as_u16();
    if status != 403 && status != 429 {
        return None;
    }
    let headers = response.headers();
    if let Some(seconds) = header_u64(headers, "retry-after") {
        return Some(Duration::from_secs(seconds.max(1)));
    }
    let remaining_zero = headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim() == "0")
        .unwrap_or(false);
    if remaining_zero {
        let reset = header_u64(headers, "x-ratelimit-reset")
            .map(|epoch| epoch.saturating_sub(Utc::now().timestamp().max(0) as u64))
            .map(|seconds| Duration::from_secs(seconds.max(1)));
        return Some(reset.unwrap_or(DEFAULT_RETRY_AFTER));
    }
    if status == 429 {
        return Some(DEFAULT_RETRY_AFTER);
    }
    None
}

fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn encode_repo_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Deserialize)]
struct ContentEntryWire {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl ContentEntryWire {
    fn into_entry(self) -> DirEntry {
        let kind = match self.kind.as_str() {
            "dir" => EntryKind::Dir,
            "file" => EntryKind::File,
            _ => EntryKind::Other,
        };
        DirEntry {
            name: self.name,
            path: self.path,
            kind,
        }
    }
}

#[derive(Deserialize)]
struct FileContentWire {
    content: Option<String>,
    encoding: Option<String>,
}

impl FileContentWire {
    fn decode(self, route: &str) -> Result<String, GithubError> {
        let content = self.content.unwrap_or_default();
        if self.encoding.as_deref() != Some("base64") {
            return Ok(content);
        }
        // The contents API wraps base64 at 60 columns.
        let compact: String = content.chars().filter(|ch| !ch.is_whitespace()).collect();
        let bytes = BASE64
            .decode(compact.as_bytes())
            .map_err(|err| GithubError::Decode {
                url: route.to_string(),
                reason: format!("invalid base64 payload: {err}"),
            })?;
        String::from_utf8(bytes).map_err(|err| GithubError::Decode {
            url: route.to_string(),
            reason: format!("file is not utf-8: {err}"),
        })
    }
}

#[derive(Deserialize)]
struct PullWire {
    number: u64,
    title: String,
    user: Option<PullUserWire>,
    head: PullHeadWire,
    html_url: String,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct PullUserWire {
    login: String,
}

#[derive(Deserialize)]
struct PullHeadWire {
    #[serde(rename = "ref")]
    head_ref: String,
}

impl PullWire {
    fn into_summary(self) -> PullRequestSummary {
        PullRequestSummary {
            number: self.number,
            title: self.title,
            author: self
                .user
                .map(|user| user.login)
                .unwrap_or_default(),
            head_ref: self.head.head_ref,
            html_url: self.html_url,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Deserialize)]
struct PullFileWire {
    filename: String,
}
