//! The pull-request filter chain.
//!
//! Each filter narrows (never grows) an ordered sequence of pull requests
//! according to one named concern, reading its governing option from the
//! shared `source` configuration. A filter whose option is unset is a strict
//! identity pass-through, so the chain can be extended without auditing the
//! default behavior of existing filters. Filters do not know about each
//! other; the composition is a plain fold in [`crate::repository`].
//!
//! Order matters only for efficiency: later filters make per-PR API calls
//! and should not pay for pull requests already excluded by cheaper ones.

use std::{collections::HashMap, sync::LazyLock};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use glob::Pattern;
use regex::Regex;
use tokio::sync::Mutex;

use crate::{config::Source, github::Github, pull_request::PullRequest};

static CI_SKIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(ci skip|skip ci)\]").expect("valid ci-skip regex"));

/// Shared state for one pipeline run: the configuration, the hosting-service
/// handle, and single-invocation caches for statuses and reviews so each is
/// fetched at most once per pull request.
pub struct FilterContext<'a> {
    pub source: &'a Source,
    pub github: &'a dyn Github,
    readiness: Mutex<HashMap<String, bool>>,
    approvals: Mutex<HashMap<u64, bool>>,
}

impl<'a> FilterContext<'a> {
    pub fn new(source: &'a Source, github: &'a dyn Github) -> Self {
        Self {
            source,
            github,
            readiness: Mutex::new(HashMap::new()),
            approvals: Mutex::new(HashMap::new()),
        }
    }

    /// True when no status tagged with this resource's context exists on the
    /// pull request's head SHA. Cached per SHA for the invocation.
    pub async fn is_ready(&self, pr: &PullRequest) -> Result<bool> {
        if let Some(&ready) = self.readiness.lock().await.get(pr.sha()) {
            return Ok(ready);
        }
        let statuses = self.github.statuses(&self.source.repo, pr.sha()).await?;
        let ready = !statuses.iter().any(|status| status.is_ours());
        self.readiness
            .lock()
            .await
            .insert(pr.sha().to_string(), ready);
        Ok(ready)
    }

    /// True when the pull request has at least one APPROVED review. Cached
    /// per PR id for the invocation.
    pub async fn review_approved(&self, pr: &PullRequest) -> Result<bool> {
        if let Some(&approved) = self.approvals.lock().await.get(&pr.id()) {
            return Ok(approved);
        }
        let reviews = self.github.reviews(&self.source.repo, pr.id()).await?;
        let approved = reviews.iter().any(|review| review.approved());
        self.approvals.lock().await.insert(pr.id(), approved);
        Ok(approved)
    }

    /// The strict mergeable predicate: the remote's computed mergeable flag,
    /// push permission on the base repository, and at least one approving
    /// review. Needs a fresh single-PR fetch because the bulk listing omits
    /// `mergeable` and permissions.
    pub async fn is_mergeable(&self, pr: &PullRequest) -> Result<bool> {
        let fresh = self.github.pull_request(&self.source.repo, pr.id()).await?;
        Ok(fresh.mergeable == Some(true)
            && fresh.push_permitted()
            && self.review_approved(pr).await?)
    }
}

/// One stage of the chain: narrow and/or reorder a sequence of pull requests
/// given the shared configuration.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>>;
}

/// The canonical chain, in composition order. `All` performs the initial
/// fetch; everything after it works on the in-memory sequence.
pub fn filter_chain() -> Vec<Box<dyn Filter>> {
    vec![
        Box::new(All),
        Box::new(Path),
        Box::new(Fork),
        Box::new(Label),
        Box::new(CiSkip),
        Box::new(Mergeable),
        Box::new(Approval),
        Box::new(Org),
        Box::new(State),
        Box::new(Context),
    ]
}

/// Fetches all open pull requests, oldest update first. The base-branch
/// constraint is applied server-side.
pub struct All;

#[async_trait]
impl Filter for All {
    fn name(&self) -> &'static str {
        "all"
    }

    async fn apply(
        &self,
        _prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        ctx.github
            .open_pull_requests(&ctx.source.repo, ctx.source.base.as_deref())
            .await
    }
}

/// Keeps pull requests whose changed files satisfy the `paths` allow-list
/// and the `ignore_paths` deny-list. A pull request is excluded by the
/// deny-list only when every changed file matches an ignore pattern.
pub struct Path;

fn compile_patterns(globs: &[String]) -> Result<Vec<Pattern>> {
    globs
        .iter()
        .map(|glob| {
            Pattern::new(glob).with_context(|| format!("invalid glob pattern \"{}\"", glob))
        })
        .collect()
}

fn matches_any(patterns: &[Pattern], filename: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(filename))
}

#[async_trait]
impl Filter for Path {
    fn name(&self) -> &'static str {
        "path"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        let paths = compile_patterns(&ctx.source.paths)?;
        let ignore_paths = compile_patterns(&ctx.source.ignore_paths)?;
        if paths.is_empty() && ignore_paths.is_empty() {
            return Ok(prs);
        }

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            let files = ctx.github.changed_files(&ctx.source.repo, pr.id()).await?;
            let allowed =
                paths.is_empty() || files.iter().any(|file| matches_any(&paths, file));
            let ignored = !ignore_paths.is_empty()
                && files.iter().all(|file| matches_any(&ignore_paths, file));
            if allowed && !ignored {
                kept.push(pr);
            }
        }
        Ok(kept)
    }
}

/// Removes pull requests from forked repositories when `disable_forks` is
/// set.
pub struct Fork;

#[async_trait]
impl Filter for Fork {
    fn name(&self) -> &'static str {
        "fork"
    }

    async fn apply(
        &self,
        mut prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        if ctx.source.disable_forks {
            prs.retain(|pr| !pr.from_fork());
        }
        Ok(prs)
    }
}

/// Applies the `no_label` exclusion, then the `label` inclusion, both
/// case-insensitive against issue labels.
pub struct Label;

#[async_trait]
impl Filter for Label {
    fn name(&self) -> &'static str {
        "label"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        let label = ctx.source.label.as_deref();
        let no_label = ctx.source.no_label.as_deref();
        if label.is_none() && no_label.is_none() {
            return Ok(prs);
        }

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            let labels = ctx.github.labels(&ctx.source.repo, pr.id()).await?;
            if let Some(no_label) = no_label {
                if labels.iter().any(|l| l.name.eq_ignore_ascii_case(no_label)) {
                    continue;
                }
            }
            if let Some(label) = label {
                if !labels.iter().any(|l| l.name.eq_ignore_ascii_case(label)) {
                    continue;
                }
            }
            kept.push(pr);
        }
        Ok(kept)
    }
}

/// Removes pull requests whose latest head-commit message asks CI to skip
/// the build. Enabled by default; disabled with `"ci_skip": false`.
pub struct CiSkip;

#[async_trait]
impl Filter for CiSkip {
    fn name(&self) -> &'static str {
        "ci-skip"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        if !ctx.source.ci_skip {
            return Ok(prs);
        }

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            let message = ctx.github.commit_message(&ctx.source.repo, pr.sha()).await?;
            if !CI_SKIP.is_match(&message) {
                kept.push(pr);
            }
        }
        Ok(kept)
    }
}

/// Keeps only pull requests satisfying the strict mergeable predicate when
/// `only_mergeable` is set.
pub struct Mergeable;

#[async_trait]
impl Filter for Mergeable {
    fn name(&self) -> &'static str {
        "mergeable"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        if !ctx.source.only_mergeable {
            return Ok(prs);
        }

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            if ctx.is_mergeable(&pr).await? {
                kept.push(pr);
            }
        }
        Ok(kept)
    }
}

/// `require_review_approval` keeps pull requests with an APPROVED review;
/// `authorship_restriction` keeps pull requests from associated authors.
/// Both conditions apply when both are configured.
pub struct Approval;

#[async_trait]
impl Filter for Approval {
    fn name(&self) -> &'static str {
        "approval"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        let mut prs = prs;
        if ctx.source.require_review_approval {
            let mut kept = Vec::with_capacity(prs.len());
            for pr in prs {
                if ctx.review_approved(&pr).await? {
                    kept.push(pr);
                }
            }
            prs = kept;
        }
        if ctx.source.authorship_restriction {
            prs.retain(|pr| pr.author_associated());
        }
        Ok(prs)
    }
}

/// Keeps only pull requests whose author is a member of the configured
/// organization.
pub struct Org;

#[async_trait]
impl Filter for Org {
    fn name(&self) -> &'static str {
        "org"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        let Some(org) = ctx.source.org.as_deref() else {
            return Ok(prs);
        };

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            let Some(login) = pr.author_login() else {
                continue;
            };
            if ctx.github.organization_member(org, login).await? {
                kept.push(pr);
            }
        }
        Ok(kept)
    }
}

/// Keeps only pull requests in the configured state (case-insensitive).
pub struct State;

#[async_trait]
impl Filter for State {
    fn name(&self) -> &'static str {
        "state"
    }

    async fn apply(
        &self,
        mut prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        if let Some(state) = ctx.source.state.as_deref() {
            prs.retain(|pr| pr.state.eq_ignore_ascii_case(state));
        }
        Ok(prs)
    }
}

/// Keeps only pull requests without one of this resource's statuses on their
/// head SHA. Identity under every-mode, where the orchestrator tracks each
/// version in its own history instead.
pub struct Context;

#[async_trait]
impl Filter for Context {
    fn name(&self) -> &'static str {
        "context"
    }

    async fn apply(
        &self,
        prs: Vec<PullRequest>,
        ctx: &FilterContext<'_>,
    ) -> Result<Vec<PullRequest>> {
        if ctx.source.every {
            return Ok(prs);
        }

        let mut kept = Vec::with_capacity(prs.len());
        for pr in prs {
            if ctx.is_ready(&pr).await? {
                kept.push(pr);
            }
        }
        Ok(kept)
    }
}
