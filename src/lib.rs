//! A Concourse resource for GitHub pull requests.
//!
//! Tracks open pull requests on a repository, decides which one (if any)
//! represents new work since the last check, materializes it as a git
//! checkout, and reports build statuses, comments and merges back to GitHub.
//! The three operations (check, in, out) each read one JSON document from
//! stdin and write one to stdout, driven by the pipeline orchestrator.
//!
//! The interesting part is the check side: a composable chain of
//! independently-enabled filters narrows the universe of open pull requests,
//! and a readiness decision keyed on (id, head SHA) guarantees at most one
//! in-flight build per pull request.

pub mod check;
pub mod config;
pub mod filters;
pub mod get;
pub mod git;
pub mod github;
pub mod pull_request;
pub mod put;
pub mod repository;

pub use config::{
    CheckInput, GetInput, GetParams, MetadataField, PutInput, PutParams, Repo, ResourceOutput,
    Source, Version, read_input,
};
pub use github::{GitHubClient, Github};
pub use pull_request::PullRequest;
pub use repository::Repository;
