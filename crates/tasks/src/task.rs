//! Pipeline tasks and their queue encoding.
//!
//! Discovery payloads are the plain `owner/repo` string. Fetch payloads are
//! JSON `{"repo": {...}, "version": {...}}`. The source is not in the payload;
//! it is implied by the queue the task sits on.

use pagemirror_core::{Error, Repo, Source, Version};
use serde::{Deserialize, Serialize};

use crate::queue::Job;

pub const DISCOVER_BRANCHES: &str = "discover-branches";
pub const DISCOVER_PACKAGES: &str = "discover-packages";
pub const DISCOVER_RELEASES: &str = "discover-releases";
pub const FETCH_BRANCHES: &str = "fetch-version-branches";
pub const FETCH_PACKAGES: &str = "fetch-version-packages";
pub const FETCH_RELEASES: &str = "fetch-version-releases";

/// Every lane the pipeline runs.
pub const QUEUES: [&str; 6] =
    [DISCOVER_BRANCHES, DISCOVER_PACKAGES, DISCOVER_RELEASES, FETCH_BRANCHES, FETCH_PACKAGES, FETCH_RELEASES];

#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// List a repository's versions and rewrite its index.
    Discover { source: Source, repo: Repo },
    /// Download and unpack one version into the store.
    FetchVersion { source: Source, repo: Repo, version: Version },
}

#[derive(Serialize, Deserialize)]
struct FetchPayload {
    repo: Repo,
    version: Version,
}

impl Task {
    pub fn source(&self) -> Source {
        match self {
            Task::Discover { source, .. } | Task::FetchVersion { source, .. } => *source,
        }
    }

    pub fn repo(&self) -> &Repo {
        match self {
            Task::Discover { repo, .. } | Task::FetchVersion { repo, .. } => repo,
        }
    }
}

fn discover_queue(source: Source) -> &'static str {
    match source {
        Source::Branches => DISCOVER_BRANCHES,
        Source::Packages => DISCOVER_PACKAGES,
        Source::Releases => DISCOVER_RELEASES,
    }
}

fn fetch_queue(source: Source) -> &'static str {
    match source {
        Source::Branches => FETCH_BRANCHES,
        Source::Packages => FETCH_PACKAGES,
        Source::Releases => FETCH_RELEASES,
    }
}

impl Job for Task {
    fn queue_name(&self) -> &'static str {
        match self {
            Task::Discover { source, .. } => discover_queue(*source),
            Task::FetchVersion { source, .. } => fetch_queue(*source),
        }
    }

    fn dedup_key(&self) -> String {
        match self {
            Task::Discover { repo, .. } => format!("fetch[{repo}]"),
            Task::FetchVersion { version, .. } => format!("fetchVersion[{}]", version.hash),
        }
    }

    fn encode(&self) -> Result<String, Error> {
        match self {
            Task::Discover { repo, .. } => Ok(repo.to_string()),
            Task::FetchVersion { repo, version, .. } => {
                Ok(serde_json::to_string(&FetchPayload { repo: repo.clone(), version: version.clone() })?)
            }
        }
    }

    fn decode(queue: &str, payload: &str) -> Result<Self, Error> {
        let (discover, source) = match queue {
            DISCOVER_BRANCHES => (true, Source::Branches),
            DISCOVER_PACKAGES => (true, Source::Packages),
            DISCOVER_RELEASES => (true, Source::Releases),
            FETCH_BRANCHES => (false, Source::Branches),
            FETCH_PACKAGES => (false, Source::Packages),
            FETCH_RELEASES => (false, Source::Releases),
            other => return Err(Error::UnknownQueue(other.to_string())),
        };

        if discover {
            return Ok(Task::Discover { source, repo: payload.parse()? });
        }

        let FetchPayload { repo, version } = serde_json::from_str(payload)
            .map_err(|e| Error::InvalidJob(format!("bad fetch payload on {queue}: {e}")))?;
        Ok(Task::FetchVersion { source, repo, version })
    }
}
