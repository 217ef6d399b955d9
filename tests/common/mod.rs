//! Shared test double for the hosting-service trait.

use std::{collections::HashMap, sync::Mutex};

use anyhow::Result;
use async_trait::async_trait;
use github_pr_resource::{
    CheckInput, PullRequest, Repo, Source,
    github::{Github, NewPullRequest, StatusRequest},
    pull_request::{CommitStatus, Label, Review},
};

/// In-memory GitHub with canned read data and recorded writes.
#[derive(Default)]
pub struct MockGithub {
    pub pulls: Vec<PullRequest>,
    /// Commit statuses keyed by head SHA.
    pub statuses: HashMap<String, Vec<CommitStatus>>,
    /// Latest commit message keyed by SHA.
    pub commit_messages: HashMap<String, String>,
    /// Issue labels keyed by PR number.
    pub labels: HashMap<u64, Vec<Label>>,
    /// Changed filenames keyed by PR number.
    pub changed_files: HashMap<u64, Vec<String>>,
    /// Reviews keyed by PR number.
    pub reviews: HashMap<u64, Vec<Review>>,
    /// (org, login) pairs that count as members.
    pub org_members: Vec<(String, String)>,

    pub listed_base: Mutex<Vec<Option<String>>>,
    pub posted_statuses: Mutex<Vec<(String, StatusRequest)>>,
    pub posted_comments: Mutex<Vec<(u64, String)>>,
    pub added_labels: Mutex<Vec<(u64, String)>>,
    pub merges: Mutex<Vec<(u64, String, String)>>,
    pub created_pulls: Mutex<Vec<NewPullRequest>>,
}

#[async_trait]
impl Github for MockGithub {
    async fn open_pull_requests(
        &self,
        _repo: &Repo,
        base: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        self.listed_base
            .lock()
            .unwrap()
            .push(base.map(str::to_string));
        Ok(self.pulls.clone())
    }

    async fn pull_request(&self, _repo: &Repo, number: u64) -> Result<PullRequest> {
        self.pulls
            .iter()
            .find(|pr| pr.id() == number)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("pull request {} not found", number))
    }

    async fn statuses(&self, _repo: &Repo, sha: &str) -> Result<Vec<CommitStatus>> {
        Ok(self.statuses.get(sha).cloned().unwrap_or_default())
    }

    async fn commit_message(&self, _repo: &Repo, sha: &str) -> Result<String> {
        Ok(self.commit_messages.get(sha).cloned().unwrap_or_default())
    }

    async fn labels(&self, _repo: &Repo, number: u64) -> Result<Vec<Label>> {
        Ok(self.labels.get(&number).cloned().unwrap_or_default())
    }

    async fn changed_files(&self, _repo: &Repo, number: u64) -> Result<Vec<String>> {
        Ok(self.changed_files.get(&number).cloned().unwrap_or_default())
    }

    async fn reviews(&self, _repo: &Repo, number: u64) -> Result<Vec<Review>> {
        Ok(self.reviews.get(&number).cloned().unwrap_or_default())
    }

    async fn organization_member(&self, org: &str, login: &str) -> Result<bool> {
        Ok(self
            .org_members
            .iter()
            .any(|(o, l)| o == org && l == login))
    }

    async fn create_status(&self, _repo: &Repo, sha: &str, status: &StatusRequest) -> Result<()> {
        self.posted_statuses
            .lock()
            .unwrap()
            .push((sha.to_string(), status.clone()));
        Ok(())
    }

    async fn create_comment(&self, _repo: &Repo, number: u64, body: &str) -> Result<()> {
        self.posted_comments
            .lock()
            .unwrap()
            .push((number, body.to_string()));
        Ok(())
    }

    async fn add_label(&self, _repo: &Repo, number: u64, label: &str) -> Result<()> {
        self.added_labels
            .lock()
            .unwrap()
            .push((number, label.to_string()));
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        _repo: &Repo,
        number: u64,
        method: &str,
        commit_message: &str,
    ) -> Result<()> {
        self.merges
            .lock()
            .unwrap()
            .push((number, method.to_string(), commit_message.to_string()));
        Ok(())
    }

    async fn create_pull_request(
        &self,
        _repo: &Repo,
        request: &NewPullRequest,
    ) -> Result<PullRequest> {
        self.created_pulls.lock().unwrap().push(request.clone());
        Ok(pr(serde_json::json!({
            "number": 99,
            "html_url": "https://github.com/jtarchie/test/pull/99",
            "head": { "sha": "newsha", "ref": request.head }
        })))
    }
}

/// Builds a pull request from an API-shaped JSON snapshot.
pub fn pr(value: serde_json::Value) -> PullRequest {
    serde_json::from_value(value).unwrap()
}

pub fn source(value: serde_json::Value) -> Source {
    serde_json::from_value(value).unwrap()
}

pub fn check_input(value: serde_json::Value) -> CheckInput {
    serde_json::from_value(value).unwrap()
}

/// A status entry owned by this resource.
pub fn our_status(state: &str) -> CommitStatus {
    serde_json::from_value(serde_json::json!({
        "context": "concourse-ci/status",
        "state": state
    }))
    .unwrap()
}

/// A status entry from some other CI system.
pub fn other_status() -> CommitStatus {
    serde_json::from_value(serde_json::json!({
        "context": "travis-ci/build",
        "state": "success"
    }))
    .unwrap()
}

pub fn label(name: &str) -> Label {
    serde_json::from_value(serde_json::json!({ "name": name })).unwrap()
}

pub fn review(state: &str) -> Review {
    serde_json::from_value(serde_json::json!({ "state": state })).unwrap()
}
