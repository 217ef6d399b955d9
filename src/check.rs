//! The check operation: discover new versions.

use anyhow::Result;

use crate::{
    config::{CheckInput, Version},
    filters::FilterContext,
    github::Github,
    pull_request::PullRequest,
    repository::Repository,
};

/// Runs one check invocation and returns the versions to emit.
///
/// In every-mode the entire filtered sequence is emitted, oldest update
/// first, and the orchestrator's version history tracks what has been built.
/// In single mode at most one new version is emitted, per the readiness
/// decision in [`Repository::next_pull_request`].
pub async fn run(input: &CheckInput, github: &dyn Github) -> Result<Vec<Version>> {
    let ctx = FilterContext::new(&input.source, github);
    let repository = Repository::new();

    if input.source.every {
        let prs = repository.pull_requests(&ctx).await?;
        return Ok(prs.iter().map(PullRequest::version).collect());
    }

    Ok(repository
        .next_pull_request(&ctx, input.version.as_ref())
        .await?
        .map(|pr| vec![pr.version()])
        .unwrap_or_default())
}
