use std::fmt;
use std::str::FromStr;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::error::GithubError;

/// `owner/name` pair identifying one repository.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl FromStr for RepoRef {
    type Err = GithubError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().trim_end_matches('/');
        let mut parts = trimmed.rsplit('/');
        let name = parts.next().filter(|part| !part.is_empty());
        let owner = parts.next().filter(|part| !part.is_empty());
        match (owner, name) {
            (Some(owner), Some(name)) => Ok(Self::new(owner, name)),
            _ => Err(GithubError::InvalidRepo(value.to_string())),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// What a directory listing entry points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Other,
}

/// One entry from a directory listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Summary of one open pull request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub head_ref: String,
    pub html_url: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A sequence collected across one or more API pages.
///
/// `partial` is set when a rate limit interrupted the walk; the items
/// gathered up to that point are still valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub partial: bool,
}

impl<T> Page<T> {
    pub fn complete(items: Vec<T>) -> Self {
        Self {
            items,
            partial: false,
        }
    }

    pub fn truncated(items: Vec<T>) -> Self {
        Self {
            items,
            partial: true,
        }
    }

    pub fn empty() -> Self {
        Self::complete(Vec::new())
    }
}
