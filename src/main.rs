use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use github_pr_resource::{
    CheckInput, GetInput, GitHubClient, PutInput, check, get, put, read_input,
};

#[derive(Parser)]
#[command(name = "github-pr-resource")]
#[command(about = "Concourse resource tracking GitHub pull requests")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Discover new pull request versions.
    Check,
    /// Fetch a pull request into a working directory.
    In { destination: PathBuf },
    /// Publish a build result for a pull request.
    Out { destination: PathBuf },
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout carries the JSON response; everything else goes to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let stdin = std::io::stdin().lock();

    let response = match cli.command {
        Command::Check => {
            let input: CheckInput = read_input(stdin)?;
            let github = GitHubClient::from_source(&input.source)?;
            serde_json::to_value(check::run(&input, &github).await?)?
        }
        Command::In { destination } => {
            let input: GetInput = read_input(stdin)?;
            let github = GitHubClient::from_source(&input.source)?;
            serde_json::to_value(get::run(&input, &destination, &github).await?)?
        }
        Command::Out { destination } => {
            let input: PutInput = read_input(stdin)?;
            let github = GitHubClient::from_source(&input.source)?;
            serde_json::to_value(put::run(&input, &destination, &github, &env_lookup).await?)?
        }
    };

    println!("{}", response);
    Ok(())
}
