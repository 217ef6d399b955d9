//! Hosting-service capability seam.
//!
//! The core filtering and decision logic only ever talks to the [`Github`]
//! trait; [`GitHubClient`] is the production implementation against the
//! GitHub REST API. Tests substitute their own implementation.
//!
//! The client performs no retries and no caching: a transient failure
//! surfaces as a fatal error for the invocation and the orchestrator re-runs
//! the whole step later.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;
use url::Url;

use crate::{
    config::{Repo, Source},
    pull_request::{CommitStatus, Label, PullRequest, Review},
};

const DEFAULT_API_ENDPOINT: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

/// A commit status to post against a head SHA.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest {
    pub state: String,
    pub context: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

/// A new pull request to open.
#[derive(Debug, Clone, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub head: String,
    pub base: String,
    pub body: String,
}

/// Everything the resource needs from the hosting service.
#[async_trait]
pub trait Github: Send + Sync {
    /// All open pull requests, oldest update first, optionally restricted to
    /// a base branch. Pagination is handled transparently; the result is the
    /// complete list.
    async fn open_pull_requests(
        &self,
        repo: &Repo,
        base: Option<&str>,
    ) -> Result<Vec<PullRequest>>;

    /// A fresh snapshot of one pull request. Unlike the bulk listing this
    /// includes the computed `mergeable` flag and base-repo permissions.
    async fn pull_request(&self, repo: &Repo, number: u64) -> Result<PullRequest>;

    /// All commit statuses on a SHA.
    async fn statuses(&self, repo: &Repo, sha: &str) -> Result<Vec<CommitStatus>>;

    /// The commit message of a single commit.
    async fn commit_message(&self, repo: &Repo, sha: &str) -> Result<String>;

    /// Issue labels on a pull request.
    async fn labels(&self, repo: &Repo, number: u64) -> Result<Vec<Label>>;

    /// Filenames changed by a pull request.
    async fn changed_files(&self, repo: &Repo, number: u64) -> Result<Vec<String>>;

    /// Reviews on a pull request.
    async fn reviews(&self, repo: &Repo, number: u64) -> Result<Vec<Review>>;

    /// Whether `login` is a member of `org`.
    async fn organization_member(&self, org: &str, login: &str) -> Result<bool>;

    async fn create_status(&self, repo: &Repo, sha: &str, status: &StatusRequest) -> Result<()>;

    async fn create_comment(&self, repo: &Repo, number: u64, body: &str) -> Result<()>;

    async fn add_label(&self, repo: &Repo, number: u64, label: &str) -> Result<()>;

    async fn merge_pull_request(
        &self,
        repo: &Repo,
        number: u64,
        method: &str,
        commit_message: &str,
    ) -> Result<()>;

    async fn create_pull_request(
        &self,
        repo: &Repo,
        request: &NewPullRequest,
    ) -> Result<PullRequest>;
}

/// REST client for the GitHub API (github.com or an enterprise endpoint).
pub struct GitHubClient {
    client: reqwest::Client,
    api_base: Url,
    token: Option<String>,
}

impl GitHubClient {
    /// Builds a client from the invocation's `source` block. Proxy settings
    /// (`http_proxy`/`no_proxy`) are picked up from the environment by
    /// reqwest.
    pub fn from_source(source: &Source) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if source.skip_ssl_verification {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().context("failed to create HTTP client")?;

        let mut endpoint = source
            .api_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        // Url::join treats a base without a trailing slash as a file, which
        // would drop the path prefix of enterprise endpoints like /api/v3.
        if !endpoint.ends_with('/') {
            endpoint.push('/');
        }
        let api_base = Url::parse(&endpoint)
            .with_context(|| format!("invalid `api_endpoint` \"{}\"", endpoint))?;

        Ok(Self {
            client,
            api_base,
            token: source.access_token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.api_base
            .join(path)
            .with_context(|| format!("invalid API path \"{}\"", path))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        debug!(%method, %url, "github api request");
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }
        request
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("GitHub API request to {} failed with {}: {}", url, status, body)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self.request(Method::GET, url).send().await?;
        Self::check(response)
            .await?
            .json()
            .await
            .context("failed to decode GitHub API response")
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: &B,
    ) -> Result<Response> {
        let response = self.request(method, url).json(body).send().await?;
        Self::check(response).await
    }

    /// Follows page-numbered pagination until a short page, returning the
    /// complete, concatenated listing.
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>> {
        let mut all = Vec::new();
        let mut page: u32 = 1;
        loop {
            let mut url = self.url(path)?;
            {
                let mut pairs = url.query_pairs_mut();
                for (key, value) in query {
                    pairs.append_pair(key, value);
                }
                pairs.append_pair("per_page", &PER_PAGE.to_string());
                pairs.append_pair("page", &page.to_string());
            }
            let batch: Vec<T> = self.get_json(url).await?;
            let len = batch.len();
            all.extend(batch);
            if len < PER_PAGE {
                return Ok(all);
            }
            page += 1;
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChangedFile {
    filename: String,
}

#[async_trait]
impl Github for GitHubClient {
    async fn open_pull_requests(
        &self,
        repo: &Repo,
        base: Option<&str>,
    ) -> Result<Vec<PullRequest>> {
        let mut query = vec![("state", "open"), ("sort", "updated"), ("direction", "asc")];
        if let Some(base) = base {
            query.push(("base", base));
        }
        self.get_paginated(&format!("repos/{}/pulls", repo), &query)
            .await
    }

    async fn pull_request(&self, repo: &Repo, number: u64) -> Result<PullRequest> {
        let url = self.url(&format!("repos/{}/pulls/{}", repo, number))?;
        self.get_json(url).await
    }

    async fn statuses(&self, repo: &Repo, sha: &str) -> Result<Vec<CommitStatus>> {
        self.get_paginated(&format!("repos/{}/statuses/{}", repo, sha), &[])
            .await
    }

    async fn commit_message(&self, repo: &Repo, sha: &str) -> Result<String> {
        let url = self.url(&format!("repos/{}/commits/{}", repo, sha))?;
        let commit: CommitResponse = self.get_json(url).await?;
        Ok(commit.commit.message)
    }

    async fn labels(&self, repo: &Repo, number: u64) -> Result<Vec<Label>> {
        self.get_paginated(&format!("repos/{}/issues/{}/labels", repo, number), &[])
            .await
    }

    async fn changed_files(&self, repo: &Repo, number: u64) -> Result<Vec<String>> {
        let files: Vec<ChangedFile> = self
            .get_paginated(&format!("repos/{}/pulls/{}/files", repo, number), &[])
            .await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn reviews(&self, repo: &Repo, number: u64) -> Result<Vec<Review>> {
        self.get_paginated(&format!("repos/{}/pulls/{}/reviews", repo, number), &[])
            .await
    }

    async fn organization_member(&self, org: &str, login: &str) -> Result<bool> {
        let url = self.url(&format!("orgs/{}/members/{}", org, login))?;
        let response = self.request(Method::GET, url).send().await?;
        match response.status() {
            StatusCode::NO_CONTENT => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => {
                Self::check(response).await?;
                Ok(false)
            }
        }
    }

    async fn create_status(&self, repo: &Repo, sha: &str, status: &StatusRequest) -> Result<()> {
        let url = self.url(&format!("repos/{}/statuses/{}", repo, sha))?;
        self.send_json(Method::POST, url, status).await?;
        Ok(())
    }

    async fn create_comment(&self, repo: &Repo, number: u64, body: &str) -> Result<()> {
        let url = self.url(&format!("repos/{}/issues/{}/comments", repo, number))?;
        self.send_json(Method::POST, url, &serde_json::json!({ "body": body }))
            .await?;
        Ok(())
    }

    async fn add_label(&self, repo: &Repo, number: u64, label: &str) -> Result<()> {
        let url = self.url(&format!("repos/{}/issues/{}/labels", repo, number))?;
        self.send_json(Method::POST, url, &serde_json::json!({ "labels": [label] }))
            .await?;
        Ok(())
    }

    async fn merge_pull_request(
        &self,
        repo: &Repo,
        number: u64,
        method: &str,
        commit_message: &str,
    ) -> Result<()> {
        let url = self.url(&format!("repos/{}/pulls/{}/merge", repo, number))?;
        self.send_json(
            Method::PUT,
            url,
            &serde_json::json!({
                "merge_method": method,
                "commit_message": commit_message,
            }),
        )
        .await?;
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &Repo,
        request: &NewPullRequest,
    ) -> Result<PullRequest> {
        let url = self.url(&format!("repos/{}/pulls", repo))?;
        let response = self.send_json(Method::POST, url, request).await?;
        response
            .json()
            .await
            .context("failed to decode created pull request")
    }
}
