//! Resource input parsing.
//!
//! Every invocation reads one JSON document from stdin:
//! `{ "source": {...}, "version": {...}, "params": {...} }`. The `source`
//! block is shared by all three operations; `version` and `params` are
//! operation-specific. All options are enumerated here with explicit
//! defaults rather than being read dynamically at first use.

use std::{fmt, io::Read, str::FromStr};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

/// A repository identified as `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let (owner, name) = (owner.into(), name.into());
        if owner.is_empty() || name.is_empty() || owner.contains('/') || name.contains('/') {
            anyhow::bail!("repository must be in 'owner/name' format, got: '{}/{}'", owner, name);
        }
        Ok(Self { owner, name })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for Repo {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.split('/').collect::<Vec<_>>()[..] {
            [owner, name] => Repo::new(owner, name),
            _ => anyhow::bail!("repository must be in 'owner/name' format, got: '{}'", s),
        }
    }
}

impl TryFrom<String> for Repo {
    type Error = anyhow::Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The version unit emitted by check and consumed by in/out.
///
/// The PR id is carried as a string because the orchestrator persists and
/// replays versions as JSON; normalizing at this boundary avoids
/// integer-vs-string identity mismatches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub commit_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr: Option<String>,
}

impl Version {
    pub fn new(commit_ref: impl Into<String>, pr: impl Into<String>) -> Self {
        Self {
            commit_ref: Some(commit_ref.into()),
            pr: Some(pr.into()),
        }
    }
}

/// Accepts either a single JSON string or an array of strings.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

fn default_true() -> bool {
    true
}

/// The `source` block shared by check, in and out.
#[derive(Debug, Clone, Deserialize)]
pub struct Source {
    pub repo: Repo,
    #[serde(default)]
    pub access_token: Option<String>,
    pub api_endpoint: Option<String>,
    pub uri: Option<String>,
    pub base: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub skip_ssl_verification: bool,
    /// Accepted for compatibility; the HTTP client performs no caching.
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub every: bool,
    #[serde(default, deserialize_with = "one_or_many")]
    pub paths: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub ignore_paths: Vec<String>,
    #[serde(default)]
    pub disable_forks: bool,
    pub label: Option<String>,
    pub no_label: Option<String>,
    #[serde(default = "default_true")]
    pub ci_skip: bool,
    #[serde(default)]
    pub only_mergeable: bool,
    #[serde(default)]
    pub require_review_approval: bool,
    #[serde(default)]
    pub authorship_restriction: bool,
    pub org: Option<String>,
    pub state: Option<String>,
}

impl Source {
    /// Clone URL, defaulting to the repository on github.com.
    pub fn uri(&self) -> String {
        self.uri
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{}", self.repo))
    }
}

#[derive(Debug, Deserialize)]
pub struct CheckInput {
    pub source: Source,
    #[serde(default)]
    pub version: Option<Version>,
}

#[derive(Debug, Deserialize)]
pub struct GetInput {
    pub source: Source,
    pub version: Version,
    #[serde(default)]
    pub params: GetParams,
}

#[derive(Debug, Deserialize)]
pub struct PutInput {
    pub source: Source,
    #[serde(default)]
    pub params: PutParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetParams {
    #[serde(default)]
    pub fetch_merge: bool,
    #[serde(default)]
    pub git: GitParams,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GitParams {
    pub depth: Option<u32>,
    pub submodules: Option<Submodules>,
    #[serde(default)]
    pub disable_lfs: bool,
}

/// `params.git.submodules`: `"all"`, `"none"`, or an explicit list of paths.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Submodules {
    Keyword(SubmoduleKeyword),
    Paths(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmoduleKeyword {
    All,
    None,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PutParams {
    pub path: Option<String>,
    /// Validated against the supported status set in the out operation so
    /// that an unsupported value produces a message naming it.
    pub status: Option<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub context: Vec<String>,
    pub comment: Option<String>,
    pub label: Option<String>,
    pub merge: Option<MergeParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MergeParams {
    pub method: Option<String>,
    pub commit_msg: Option<String>,
}

/// One `{name, value}` entry in the metadata array of an in/out response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataField {
    pub name: String,
    pub value: String,
}

impl MetadataField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The JSON document written to stdout by the in and out operations.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceOutput {
    pub version: Version,
    pub metadata: Vec<MetadataField>,
}

/// Parses one resource input document from the given reader.
pub fn read_input<T: DeserializeOwned>(reader: impl Read) -> Result<T> {
    serde_json::from_reader(reader).context("failed to parse resource input from stdin")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_parses_owner_and_name() {
        let repo: Repo = "jtarchie/test".parse().unwrap();
        assert_eq!(repo.owner(), "jtarchie");
        assert_eq!(repo.name(), "test");
        assert_eq!(repo.to_string(), "jtarchie/test");
    }

    #[test]
    fn repo_rejects_malformed_names() {
        assert!("jtarchie".parse::<Repo>().is_err());
        assert!("a/b/c".parse::<Repo>().is_err());
        assert!("/".parse::<Repo>().is_err());
    }

    #[test]
    fn source_defaults() {
        let source: Source = serde_json::from_value(serde_json::json!({
            "repo": "jtarchie/test"
        }))
        .unwrap();

        assert!(source.ci_skip);
        assert!(!source.every);
        assert!(!source.disable_forks);
        assert!(source.paths.is_empty());
        assert_eq!(source.uri(), "https://github.com/jtarchie/test");
    }

    #[test]
    fn paths_accept_string_or_list() {
        let source: Source = serde_json::from_value(serde_json::json!({
            "repo": "jtarchie/test",
            "paths": "the/path/**",
            "ignore_paths": ["docs/*", "*.md"]
        }))
        .unwrap();

        assert_eq!(source.paths, vec!["the/path/**"]);
        assert_eq!(source.ignore_paths, vec!["docs/*", "*.md"]);
    }

    #[test]
    fn version_round_trips_as_strings() {
        let version = Version::new("abcdef", "1");
        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json, serde_json::json!({"ref": "abcdef", "pr": "1"}));

        let back: Version = serde_json::from_value(json).unwrap();
        assert_eq!(back, version);
    }

    #[test]
    fn version_without_pr_omits_the_key() {
        let version = Version {
            commit_ref: Some("abcdef".to_string()),
            pr: None,
        };
        let json = serde_json::to_value(&version).unwrap();
        assert_eq!(json, serde_json::json!({"ref": "abcdef"}));
    }

    #[test]
    fn submodule_params_parse_all_forms() {
        let all: GitParams =
            serde_json::from_value(serde_json::json!({"submodules": "all"})).unwrap();
        assert_eq!(all.submodules, Some(Submodules::Keyword(SubmoduleKeyword::All)));

        let none: GitParams =
            serde_json::from_value(serde_json::json!({"submodules": "none"})).unwrap();
        assert_eq!(none.submodules, Some(Submodules::Keyword(SubmoduleKeyword::None)));

        let paths: GitParams =
            serde_json::from_value(serde_json::json!({"submodules": ["vendor/a"]})).unwrap();
        assert_eq!(paths.submodules, Some(Submodules::Paths(vec!["vendor/a".to_string()])));
    }

    #[test]
    fn put_params_context_accepts_string_or_list() {
        let params: PutParams =
            serde_json::from_value(serde_json::json!({"context": "unit"})).unwrap();
        assert_eq!(params.context, vec!["unit"]);

        let params: PutParams =
            serde_json::from_value(serde_json::json!({"context": ["unit", "lint"]})).unwrap();
        assert_eq!(params.context, vec!["unit", "lint"]);
    }
}
