//! Orchestrates the filter chain and the single-mode version decision.

use anyhow::Result;
use tracing::debug;

use crate::{
    config::Version,
    filters::{Filter, FilterContext, filter_chain},
    pull_request::PullRequest,
};

/// Threads the raw open-pull-request listing through the ordered chain of
/// filters and applies the next-version decision on the survivors.
pub struct Repository {
    filters: Vec<Box<dyn Filter>>,
}

impl Repository {
    pub fn new() -> Self {
        Self {
            filters: filter_chain(),
        }
    }

    /// The filtered, ordered pull requests for this invocation.
    pub async fn pull_requests(&self, ctx: &FilterContext<'_>) -> Result<Vec<PullRequest>> {
        let mut prs = Vec::new();
        for filter in &self.filters {
            prs = filter.apply(prs, ctx).await?;
            debug!(filter = filter.name(), remaining = prs.len(), "applied filter");
        }
        Ok(prs)
    }

    /// Single-mode decision: given the previously emitted version, pick zero
    /// or one pull request to build next.
    ///
    /// If the prior (id, sha) pair is still present and ready there is
    /// nothing new to do. Otherwise the first ready pull request other than
    /// the prior one, in ascending update order, becomes the next version.
    pub async fn next_pull_request(
        &self,
        ctx: &FilterContext<'_>,
        last: Option<&Version>,
    ) -> Result<Option<PullRequest>> {
        let prs = self.pull_requests(ctx).await?;
        if prs.is_empty() {
            return Ok(None);
        }

        let mut current: Option<&PullRequest> = None;
        if let Some(Version {
            commit_ref: Some(sha),
            pr: Some(id),
        }) = last
        {
            current = prs.iter().find(|pr| pr.equals(id, sha));
            if let Some(current) = current {
                if ctx.is_ready(current).await? {
                    return Ok(None);
                }
            }
        }

        for pr in &prs {
            let is_current =
                current.is_some_and(|c| c.id() == pr.id() && c.sha() == pr.sha());
            if !is_current && ctx.is_ready(pr).await? {
                return Ok(Some(pr.clone()));
            }
        }
        Ok(None)
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::new()
    }
}
