//! Data model shared by the pipeline and the read path.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::hash::ContentHash;

/// Label of the version published from the canonical pages branch.
pub const LATEST_LABEL: &str = "latest";

/// Name of the archive looked up in packages and release attachments.
pub const DOCS_ARCHIVE: &str = "docs.zip";

/// File served for an empty path or a path ending in `/`.
pub const INDEX_FILE: &str = "index.html";

/// Extra-field key holding the forge release id (decimal string).
pub const RELEASE_ID: &str = "releaseID";

/// Extra-field key holding the forge attachment id (decimal string).
pub const RELEASE_ATTACHMENT_ID: &str = "releaseAttachmentID";

/// A forge repository, identified by owner and name.
///
/// Case-sensitive; no normalization is performed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct Repo {
    pub owner: String,
    pub repo: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self { owner: owner.into(), repo: repo.into() }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for Repo {
    type Err = Error;

    /// Parse `owner/repo`, splitting at the first `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok(Self::new(owner, repo)),
            _ => Err(Error::InvalidJob(format!("expected owner/repo, got {s:?}"))),
        }
    }
}

/// Where a repository publishes its documentation bundles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// `gh-pages` and `gh-pages-<label>` branches.
    #[default]
    Branches,
    /// Generic packages named after the repository carrying a `docs.zip`.
    Packages,
    /// Published releases with a `docs.zip` attachment.
    Releases,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::Branches => "branches",
            Source::Packages => "packages",
            Source::Releases => "releases",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branches" => Ok(Source::Branches),
            "packages" => Ok(Source::Packages),
            "releases" => Ok(Source::Releases),
            other => Err(Error::InvalidInput(format!("unknown source: {other}"))),
        }
    }
}

/// One publishable version of a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Version {
    /// Tag, package version, branch suffix, or `latest`.
    #[serde(rename = "name")]
    pub label: String,
    pub created_at: DateTime<Utc>,
    /// Key of the version manifest; empty until known.
    #[serde(rename = "sha", default)]
    pub hash: ContentHash,
    /// Source-specific fields needed to re-fetch the version.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Version {
    pub fn new(label: impl Into<String>, created_at: DateTime<Utc>, hash: ContentHash) -> Self {
        Self { label: label.into(), created_at, hash, extra: BTreeMap::new() }
    }

    /// Read a string extra field as an integer id.
    pub fn extra_id(&self, key: &str) -> Result<i64, Error> {
        let value = self
            .extra
            .get(key)
            .ok_or_else(|| Error::Configuration(format!("version {} has no {key}", self.label)))?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::Configuration(format!("{key} is not a string: {value}")))?;
        raw.parse()
            .map_err(|e| Error::Configuration(format!("failed to parse {key} {raw:?}: {e}")))
    }
}

/// Everything known about a repository's published versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepoIndex {
    pub repo: Repo,
    pub latest: Version,
    pub versions: Vec<Version>,
}

impl RepoIndex {
    /// Build an index from a discovery run.
    ///
    /// Versions are ordered newest first and the newest becomes `latest`.
    /// Returns `None` for an empty run so a previous index is never replaced
    /// by nothing.
    pub fn from_versions(repo: Repo, mut versions: Vec<Version>) -> Option<Self> {
        versions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let latest = versions.first()?.clone();
        Some(Self { repo, latest, versions })
    }

    /// Resolve a label; the empty label means `latest`.
    pub fn find(&self, label: &str) -> Option<&Version> {
        if label.is_empty() {
            return Some(&self.latest);
        }
        self.versions.iter().find(|v| v.label == label)
    }
}

/// One file of a cached version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PageFile {
    pub name: String,
    #[serde(rename = "sha")]
    pub hash: ContentHash,
}

/// The file tree of one cached version, keyed in the store by version hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Manifest(pub Vec<PageFile>);

impl Manifest {
    pub fn find(&self, path: &str) -> Option<&ContentHash> {
        self.0.iter().find(|f| f.name == path).map(|f| &f.hash)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Apply the implicit `index.html` to an empty path or a directory path.
pub fn page_path(path: &str) -> String {
    if path.is_empty() {
        INDEX_FILE.to_string()
    } else if path.ends_with('/') {
        format!("{path}{INDEX_FILE}")
    } else {
        path.to_string()
    }
}

/// Numeric user id on the forge.
pub type ForgeUid = i64;

/// A browser session, pointing at a forge user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub forge_uid: ForgeUid,
}

/// OAuth2 token material as issued by the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// A forge user known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub forge_uid: ForgeUid,
    pub token: Option<Token>,
    #[serde(default)]
    pub has_webhook: bool,
}
