//! The in operation: materialize a version as a filesystem checkout.
//!
//! Clones the repository, fetches the pull request's head (or merge) ref
//! into a local `pr-<head-ref>` branch, checks it out and records the pull
//! request's metadata both as files under `.git/` and as `pullrequest.*`
//! git config keys for the out operation to read back.

use std::path::Path;

use anyhow::{Context, Result};

use crate::{
    config::{GetInput, MetadataField, ResourceOutput, SubmoduleKeyword, Submodules, Version},
    git::GitRepository,
    github::Github,
    pull_request::PullRequest,
};

pub async fn run(
    input: &GetInput,
    destination: &Path,
    github: &dyn Github,
) -> Result<ResourceOutput> {
    let number = pull_request_number(&input.version)?;
    let pr = github.pull_request(&input.source.repo, number).await?;

    if input.params.fetch_merge && pr.mergeable == Some(false) {
        anyhow::bail!("PR has merge conflicts");
    }

    let depth = input.params.git.depth;
    let repo = GitRepository::clone(&input.source.uri(), destination, depth).await?;

    write_metadata_files(destination, &pr)?;

    let remote_ref = if input.params.fetch_merge { "merge" } else { "head" };
    let local_branch = format!("pr-{}", pr.head_branch());
    repo.fetch_pull_request(number, remote_ref, &local_branch)
        .await?;
    repo.checkout(&local_branch).await?;

    let id = pr.id().to_string();
    for (key, value) in [
        ("pullrequest.url", pr.url()),
        ("pullrequest.id", id.as_str()),
        ("pullrequest.branch", pr.head_branch()),
        ("pullrequest.basebranch", pr.base_branch()),
        ("pullrequest.basesha", pr.base.sha.as_str()),
        ("pullrequest.userlogin", pr.author_login().unwrap_or_default()),
        ("pullrequest.body", pr.body.as_deref().unwrap_or_default()),
    ] {
        repo.add_config(key, value).await?;
    }

    match &input.params.git.submodules {
        None | Some(Submodules::Keyword(SubmoduleKeyword::All)) => {
            repo.update_submodules(depth, None).await?;
        }
        Some(Submodules::Keyword(SubmoduleKeyword::None)) => {}
        Some(Submodules::Paths(paths)) => {
            for path in paths {
                repo.update_submodules(depth, Some(path)).await?;
            }
        }
    }

    if !input.params.git.disable_lfs {
        repo.lfs_fetch_and_checkout().await;
    }

    Ok(output(&input.version, &pr))
}

fn pull_request_number(version: &Version) -> Result<u64> {
    let id = version
        .pr
        .as_deref()
        .context("`version.pr` is required to fetch a pull request")?;
    id.parse()
        .with_context(|| format!("invalid pull request id \"{}\"", id))
}

/// Plain-file copies of the metadata, for tasks that read `.git/id` and
/// friends instead of git config.
fn write_metadata_files(destination: &Path, pr: &PullRequest) -> Result<()> {
    let git_dir = destination.join(".git");
    let id = pr.id().to_string();
    for (name, value) in [
        ("url", pr.url()),
        ("id", id.as_str()),
        ("branch", pr.head_branch()),
        ("base_branch", pr.base_branch()),
        ("base_sha", pr.base.sha.as_str()),
        ("userlogin", pr.author_login().unwrap_or_default()),
        ("body", pr.body.as_deref().unwrap_or_default()),
    ] {
        let path = git_dir.join(name);
        std::fs::write(&path, format!("{}\n", value))
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn output(version: &Version, pr: &PullRequest) -> ResourceOutput {
    let commit_ref = version
        .commit_ref
        .clone()
        .unwrap_or_else(|| pr.sha().to_string());
    ResourceOutput {
        version: Version::new(commit_ref, pr.id().to_string()),
        metadata: vec![MetadataField::new("url", pr.url())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_requires_a_pull_request_id() {
        let missing = Version {
            commit_ref: Some("abcdef".to_string()),
            pr: None,
        };
        assert!(pull_request_number(&missing).is_err());

        let bad = Version::new("abcdef", "not-a-number");
        assert!(pull_request_number(&bad).is_err());

        let good = Version::new("abcdef", "7");
        assert_eq!(pull_request_number(&good).unwrap(), 7);
    }

    #[test]
    fn output_echoes_the_requested_ref() {
        let pr: PullRequest = serde_json::from_value(serde_json::json!({
            "number": 1,
            "html_url": "https://github.com/jtarchie/test/pull/1",
            "head": { "sha": "abcdef" }
        }))
        .unwrap();

        let out = output(&Version::new("abcdef", "1"), &pr);
        assert_eq!(out.version, Version::new("abcdef", "1"));
        assert_eq!(
            out.metadata,
            vec![MetadataField::new("url", "https://github.com/jtarchie/test/pull/1")]
        );
    }
}
