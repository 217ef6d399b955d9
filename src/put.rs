//! The out operation: publish a build result back to the pull request.
//!
//! Reads the pull request identity recorded by the in operation out of the
//! working tree, then posts statuses and performs the optional comment,
//! label and merge side effects. Every failure aborts the invocation;
//! nothing is rolled back because nothing is persisted locally.

use std::{
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{Context, Result};

use crate::{
    config::{MetadataField, PutInput, PutParams, Repo, ResourceOutput, Source, Version},
    git::GitRepository,
    github::{Github, NewPullRequest, StatusRequest},
    pull_request::{PullRequest, STATUS_CONTEXT_PREFIX},
};

/// Build-identity environment variables that may be interpolated into a
/// status context with `$VAR` or `${VAR}` syntax. Nothing else is expanded.
pub const CONTEXT_ENV_VARS: [&str; 6] = [
    "BUILD_ID",
    "BUILD_NAME",
    "BUILD_JOB_NAME",
    "BUILD_PIPELINE_NAME",
    "BUILD_TEAM_NAME",
    "ATC_EXTERNAL_URL",
];

/// Environment lookup, injected so publishing is testable without touching
/// process-global state.
pub type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failure,
    Error,
    Pending,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Error => "error",
            BuildStatus::Pending => "pending",
        }
    }
}

impl FromStr for BuildStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "success" => Ok(BuildStatus::Success),
            "failure" => Ok(BuildStatus::Failure),
            "error" => Ok(BuildStatus::Error),
            "pending" => Ok(BuildStatus::Pending),
            other => anyhow::bail!(
                "`status` \"{}\" is not supported -- only success, failure, error, or pending",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

impl FromStr for MergeMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(MergeMethod::Merge),
            "squash" => Ok(MergeMethod::Squash),
            "rebase" => Ok(MergeMethod::Rebase),
            other => anyhow::bail!(
                "`merge.method` \"{}\" is not supported -- only merge, squash, or rebase",
                other
            ),
        }
    }
}

/// The validated side effects of one out invocation. Referenced files are
/// read up front so configuration errors surface before any remote call.
#[derive(Debug, Clone)]
pub struct Publication {
    pub status: BuildStatus,
    pub contexts: Vec<String>,
    pub comment: Option<String>,
    pub label: Option<String>,
    pub merge: Option<(MergeMethod, String)>,
}

impl Publication {
    /// Validates `params` against the destination directory and returns the
    /// publication plus the working-tree path named by `params.path`.
    pub fn from_params(params: &PutParams, destination: &Path) -> Result<(Self, PathBuf)> {
        let status: BuildStatus = params
            .status
            .as_deref()
            .context("`status` required in `params`")?
            .parse()?;

        let rel_path = params.path.as_deref().context("`path` required in `params`")?;
        let path = destination.join(rel_path);
        if !path.exists() {
            anyhow::bail!("`path` \"{}\" does not exist", rel_path);
        }

        let comment = match params.comment.as_deref() {
            Some(comment_path) => {
                let full = destination.join(comment_path);
                if !full.exists() {
                    anyhow::bail!("`comment` \"{}\" does not exist", comment_path);
                }
                Some(
                    std::fs::read_to_string(&full)
                        .with_context(|| format!("failed to read `comment` \"{}\"", comment_path))?,
                )
            }
            None => None,
        };

        let merge = match &params.merge {
            Some(merge) => {
                let method: MergeMethod = merge
                    .method
                    .as_deref()
                    .context("`merge.method` required in `params`")?
                    .parse()?;
                let message = match merge.commit_msg.as_deref() {
                    Some(msg_path) => std::fs::read_to_string(destination.join(msg_path))
                        .with_context(|| {
                            format!("failed to read `merge.commit_msg` \"{}\"", msg_path)
                        })?,
                    None => String::new(),
                };
                Some((method, message))
            }
            None => None,
        };

        let contexts = if params.context.is_empty() {
            vec!["status".to_string()]
        } else {
            params.context.clone()
        };

        Ok((
            Self {
                status,
                contexts,
                comment,
                label: params.label.clone(),
                merge,
            },
            path,
        ))
    }
}

pub async fn run(
    input: &PutInput,
    destination: &Path,
    github: &dyn Github,
    env: EnvLookup<'_>,
) -> Result<ResourceOutput> {
    let (publication, worktree) = Publication::from_params(&input.params, destination)?;
    let repo = GitRepository::open(&worktree);

    let sha = repo.head_sha().await?;
    let pr = match repo.config_value("pullrequest.id").await?.as_deref() {
        // A working tree checked out from a bare commit has no recorded id;
        // the status is posted against the SHA alone.
        None => None,
        Some("new") => Some(create_pull_request(&input.source, &repo, github).await?),
        Some(id) => {
            let number: u64 = id
                .parse()
                .with_context(|| format!("invalid pullrequest.id \"{}\" in working tree", id))?;
            Some(github.pull_request(&input.source.repo, number).await?)
        }
    };

    publish(&input.source, github, &publication, pr.as_ref(), &sha, env).await
}

/// Opens a brand-new pull request for the branch checked out in the working
/// tree, used when the recorded id is the sentinel `new`.
async fn create_pull_request(
    source: &Source,
    repo: &GitRepository,
    github: &dyn Github,
) -> Result<PullRequest> {
    let remote = repo.remote_url().await?;
    let remote_repo = parse_remote_repo(&remote)?;
    if remote_repo != source.repo {
        anyhow::bail!(
            "git remote points at {} but `source.repo` is {}",
            remote_repo,
            source.repo
        );
    }

    let head = repo.current_branch().await?;
    let base = source.base.clone().unwrap_or_else(|| "master".to_string());
    let title = repo.head_commit_subject().await?;
    github
        .create_pull_request(
            &source.repo,
            &NewPullRequest {
                title,
                head,
                base,
                body: String::new(),
            },
        )
        .await
}

/// Performs the remote side effects and builds the response document.
pub async fn publish(
    source: &Source,
    github: &dyn Github,
    publication: &Publication,
    pr: Option<&PullRequest>,
    sha: &str,
    env: EnvLookup<'_>,
) -> Result<ResourceOutput> {
    let atc_url = source.base_url.clone().or_else(|| env("ATC_EXTERNAL_URL"));
    let target_url =
        atc_url.map(|url| format!("{}/builds/{}", url, env("BUILD_ID").unwrap_or_default()));

    for context in &publication.contexts {
        let context = expand_context(context, env);
        github
            .create_status(
                &source.repo,
                sha,
                &StatusRequest {
                    state: publication.status.as_str().to_string(),
                    context: format!("{}/{}", STATUS_CONTEXT_PREFIX, context),
                    description: format!("Concourse CI build {}", publication.status.as_str()),
                    target_url: target_url.clone(),
                },
            )
            .await?;
    }

    match pr {
        Some(pr) => {
            if let Some(comment) = &publication.comment {
                github.create_comment(&source.repo, pr.id(), comment).await?;
            }
            if let Some(label) = &publication.label {
                github.add_label(&source.repo, pr.id(), label).await?;
            }
            if let Some((method, message)) = &publication.merge {
                github
                    .merge_pull_request(&source.repo, pr.id(), method.as_str(), message)
                    .await?;
            }
        }
        None => {
            if publication.comment.is_some()
                || publication.label.is_some()
                || publication.merge.is_some()
            {
                anyhow::bail!(
                    "working tree has no associated pull request; `comment`, `label` and `merge` require one"
                );
            }
        }
    }

    let mut metadata = vec![MetadataField::new("status", publication.status.as_str())];
    let version = match pr {
        Some(pr) => {
            metadata.push(MetadataField::new("url", pr.url()));
            Version::new(sha, pr.id().to_string())
        }
        None => Version {
            commit_ref: Some(sha.to_string()),
            pr: None,
        },
    };

    Ok(ResourceOutput { version, metadata })
}

/// Substitutes `$VAR` / `${VAR}` occurrences of the whitelisted variables.
/// Unset variables are left untouched.
pub fn expand_context(template: &str, env: EnvLookup<'_>) -> String {
    let mut expanded = template.to_string();
    for var in CONTEXT_ENV_VARS {
        if let Some(value) = env(var) {
            expanded = expanded.replace(&format!("${{{}}}", var), &value);
            expanded = expanded.replace(&format!("${}", var), &value);
        }
    }
    expanded
}

/// Recovers `owner/name` from an SSH or HTTPS GitHub remote URL.
fn parse_remote_repo(remote: &str) -> Result<Repo> {
    let trimmed = remote.trim();
    let path = trimmed
        .strip_prefix("git@github.com:")
        .or_else(|| trimmed.strip_prefix("https://github.com/"))
        .with_context(|| format!("unsupported git remote URL \"{}\"", remote))?;
    let path = path.strip_suffix(".git").unwrap_or(path);
    path.trim_end_matches('/').parse()
}
