//! Pull request entity and the wire models it is built from.
//!
//! A `PullRequest` wraps one API snapshot of an open pull request. It is
//! constructed fresh on every invocation and never mutated; the orchestrator
//! persists the emitted `Version` externally and replays it as input on the
//! next check.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Version;

/// Namespace prefix for commit statuses posted by this resource. A status
/// whose context starts with this prefix marks a (pr, sha) pair as already
/// triggered.
pub const STATUS_CONTEXT_PREFIX: &str = "concourse-ci";

/// Author associations that count as "associated" with the base repository.
const ASSOCIATED_AUTHORS: [&str; 3] = ["OWNER", "COLLABORATOR", "MEMBER"];

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub author_association: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
    pub head: Branch,
    #[serde(default)]
    pub base: Branch,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Branch {
    #[serde(rename = "ref", default)]
    pub name: String,
    #[serde(default)]
    pub sha: String,
    #[serde(default)]
    pub repo: Option<RepoInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoInfo {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub permissions: Option<Permissions>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub push: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    #[serde(default)]
    pub login: String,
}

impl PullRequest {
    pub fn id(&self) -> u64 {
        self.number
    }

    pub fn sha(&self) -> &str {
        &self.head.sha
    }

    pub fn url(&self) -> &str {
        &self.html_url
    }

    pub fn head_branch(&self) -> &str {
        &self.head.name
    }

    pub fn base_branch(&self) -> &str {
        &self.base.name
    }

    pub fn head_repo(&self) -> Option<&str> {
        self.head.repo.as_ref().map(|r| r.full_name.as_str())
    }

    pub fn base_repo(&self) -> Option<&str> {
        self.base.repo.as_ref().map(|r| r.full_name.as_str())
    }

    pub fn author_login(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.login.as_str())
    }

    /// True when the head branch lives in a different repository than the
    /// base branch.
    pub fn from_fork(&self) -> bool {
        self.head_repo() != self.base_repo()
    }

    /// True when the author is an owner, collaborator or member of the base
    /// repository.
    pub fn author_associated(&self) -> bool {
        self.author_association
            .as_deref()
            .is_some_and(|a| ASSOCIATED_AUTHORS.contains(&a))
    }

    /// Whether the authenticated user has push permission on the base
    /// repository.
    pub fn push_permitted(&self) -> bool {
        self.base
            .repo
            .as_ref()
            .and_then(|r| r.permissions)
            .is_some_and(|p| p.push)
    }

    /// Value equality against a remembered prior version. The prior id is
    /// always string-typed because it round-tripped through JSON.
    pub fn equals(&self, id: &str, sha: &str) -> bool {
        self.sha() == sha && self.number.to_string() == id
    }

    /// The canonical version payload for this snapshot.
    pub fn version(&self) -> Version {
        Version::new(self.sha(), self.number.to_string())
    }
}

/// One review on a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub state: String,
}

impl Review {
    pub fn approved(&self) -> bool {
        self.state == "APPROVED"
    }
}

/// One commit status entry on a head SHA.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitStatus {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub state: String,
}

impl CommitStatus {
    /// Whether this status was posted by this resource.
    pub fn is_ours(&self) -> bool {
        self.context.starts_with(STATUS_CONTEXT_PREFIX)
    }
}

/// An issue label attached to a pull request.
#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    #[serde(default)]
    pub name: String,
}
