//! Thin wrapper over the git command line.
//!
//! All git stdout/stderr is routed away from stdout, which is reserved for
//! the resource's JSON response. Failures are reported with fixed, short
//! messages so orchestrator logs stay readable.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::warn;

/// A git working tree on disk.
pub struct GitRepository {
    dir: PathBuf,
}

impl GitRepository {
    /// Clones `uri` into `destination`, optionally shallow.
    pub async fn clone(uri: &str, destination: &Path, depth: Option<u32>) -> Result<Self> {
        let depth_arg = depth.map(|d| d.to_string());
        let destination_arg = destination.display().to_string();

        let mut args = vec!["clone"];
        if let Some(depth) = &depth_arg {
            args.push("--depth");
            args.push(depth);
        }
        args.push(uri);
        args.push(&destination_arg);

        run_checked(None, &args, "git clone failed").await?;
        Ok(Self::open(destination))
    }

    /// Wraps an existing working tree without touching it.
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetches a pull request ref (`pull/<n>/head` or `pull/<n>/merge`) into
    /// a local branch.
    pub async fn fetch_pull_request(
        &self,
        number: u64,
        remote_ref: &str,
        local_branch: &str,
    ) -> Result<()> {
        let refspec = format!("pull/{}/{}:{}", number, remote_ref, local_branch);
        run_checked(
            Some(&self.dir),
            &["fetch", "-q", "origin", &refspec],
            "git fetch failed",
        )
        .await
    }

    pub async fn checkout(&self, branch: &str) -> Result<()> {
        run_checked(Some(&self.dir), &["checkout", branch], "git checkout failed").await
    }

    pub async fn add_config(&self, key: &str, value: &str) -> Result<()> {
        run_checked(
            Some(&self.dir),
            &["config", "--add", key, value],
            "git config failed",
        )
        .await
    }

    /// Reads a config value; a missing key is `None`, not an error.
    pub async fn config_value(&self, key: &str) -> Result<Option<String>> {
        let output = git_command(Some(&self.dir), &["config", "--get", key])
            .stdout(Stdio::piped())
            .output()
            .await
            .context("failed to run git")?;
        if output.status.success() {
            let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
            Ok((!value.is_empty()).then_some(value))
        } else {
            Ok(None)
        }
    }

    pub async fn head_sha(&self) -> Result<String> {
        self.capture(&["rev-parse", "HEAD"]).await
    }

    pub async fn current_branch(&self) -> Result<String> {
        self.capture(&["rev-parse", "--abbrev-ref", "HEAD"]).await
    }

    /// Subject line of the HEAD commit.
    pub async fn head_commit_subject(&self) -> Result<String> {
        self.capture(&["log", "-1", "--format=%s"]).await
    }

    pub async fn remote_url(&self) -> Result<String> {
        self.config_value("remote.origin.url")
            .await?
            .context("could not determine the git remote URL")
    }

    pub async fn update_submodules(&self, depth: Option<u32>, path: Option<&str>) -> Result<()> {
        let depth_arg = depth.map(|d| d.to_string());
        let mut args = vec!["submodule", "update", "--init", "--recursive"];
        if let Some(depth) = &depth_arg {
            args.push("--depth");
            args.push(depth);
        }
        if let Some(path) = path {
            args.push(path);
        }
        run_checked(Some(&self.dir), &args, "git submodule update failed").await
    }

    /// LFS content is fetched best-effort: a missing `git-lfs` must not fail
    /// checkouts of repositories that never use it.
    pub async fn lfs_fetch_and_checkout(&self) {
        for args in [["lfs", "fetch"], ["lfs", "checkout"]] {
            if run_checked(Some(&self.dir), &args, "git lfs failed").await.is_err() {
                warn!("git {} {} failed, continuing without LFS content", args[0], args[1]);
                return;
            }
        }
    }

    async fn capture(&self, args: &[&str]) -> Result<String> {
        let output = git_command(Some(&self.dir), args)
            .stdout(Stdio::piped())
            .output()
            .await
            .context("failed to run git")?;
        if !output.status.success() {
            anyhow::bail!("git {} failed", args.join(" "));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

fn git_command(dir: Option<&Path>, args: &[&str]) -> Command {
    let mut command = Command::new("git");
    if let Some(dir) = dir {
        command.current_dir(dir);
    }
    command
        .args(args)
        .stdin(Stdio::null())
        // stdout is reserved for the resource's JSON response.
        .stdout(Stdio::null())
        .stderr(Stdio::inherit());
    command
}

async fn run_checked(dir: Option<&Path>, args: &[&str], failure: &'static str) -> Result<()> {
    let status = git_command(dir, args)
        .status()
        .await
        .context("failed to run git")?;
    if !status.success() {
        anyhow::bail!("{}", failure);
    }
    Ok(())
}
