//! Version discovery.
//!
//! Each source lists a repository's published versions in its own way:
//!
//! - **Branches**: the pages branch is `latest`; `<prefix><label>` branches
//!   are labelled versions. The hash is the head commit id.
//! - **Packages**: generic packages named after the repository that carry a
//!   `docs.zip`. The hash is the file's declared SHA-256.
//! - **Releases**: published, non-prerelease releases with a `docs.zip`
//!   attachment. The hash is the attachment UUID.
//!
//! A successful listing replaces the repository index and enqueues one fetch
//! per version. An empty listing leaves the previous index in place.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use pagemirror_client::{Forge, collect_pages};
use pagemirror_core::types::{DOCS_ARCHIVE, LATEST_LABEL, RELEASE_ATTACHMENT_ID, RELEASE_ID};
use pagemirror_core::{ContentHash, Error, Repo, RepoIndex, Source, Version};

use crate::pipeline::{Pipeline, PipelineConfig};
use crate::queue::Queue;
use crate::task::Task;

/// List every version of `repo` published through `source`.
pub async fn list_versions(
    forge: &dyn Forge, config: &PipelineConfig, source: Source, repo: &Repo,
) -> Result<Vec<Version>, Error> {
    match source {
        Source::Branches => branch_versions(forge, config, repo).await,
        Source::Packages => package_versions(forge, config, repo).await,
        Source::Releases => release_versions(forge, config, repo).await,
    }
}

pub async fn branch_versions(forge: &dyn Forge, config: &PipelineConfig, repo: &Repo) -> Result<Vec<Version>, Error> {
    let branches = collect_pages(config.page_size, move |opts| forge.list_branches(&repo.owner, &repo.repo, opts)).await?;

    let discovered_at = Utc::now();
    let mut latest = None;
    let mut versions = Vec::new();

    for branch in branches {
        let hash = ContentHash::from_declared(&branch.commit.id);
        if branch.name == config.pages_branch {
            latest = Some(hash);
            continue;
        }
        let Some(label) = branch.name.strip_prefix(config.pages_branch_prefix.as_str()) else {
            continue;
        };
        if label.is_empty() || label == LATEST_LABEL {
            tracing::warn!(%repo, branch = %branch.name, "ignoring branch with reserved label");
            continue;
        }
        versions.push(Version::new(label, branch.commit.timestamp, hash));
    }

    if let Some(hash) = latest {
        // `latest` must sort first, even against commits dated in the future.
        let newest = versions.iter().map(|v| v.created_at).max();
        let created_at = match newest {
            Some(newest) if newest >= discovered_at => newest + Duration::seconds(1),
            _ => discovered_at,
        };
        versions.insert(0, Version::new(LATEST_LABEL, created_at, hash));
    }

    Ok(versions)
}

pub async fn package_versions(forge: &dyn Forge, config: &PipelineConfig, repo: &Repo) -> Result<Vec<Version>, Error> {
    let packages = collect_pages(config.page_size, move |opts| forge.list_packages(&repo.owner, opts)).await?;

    let mut versions = Vec::new();
    for package in packages {
        if package.kind != "generic" || package.name != repo.repo {
            continue;
        }

        let files = forge
            .list_package_files(&repo.owner, &package.kind, &package.name, &package.version)
            .await?;
        let mut docs = files.into_iter().filter(|f| f.name == DOCS_ARCHIVE);
        let Some(file) = docs.next() else {
            tracing::debug!(%repo, version = %package.version, "package has no {DOCS_ARCHIVE}");
            continue;
        };
        if docs.next().is_some() {
            tracing::warn!(%repo, version = %package.version, "package has several {DOCS_ARCHIVE} files, using the first");
        }

        versions.push(Version::new(package.version, package.created_at, ContentHash::from_declared(&file.sha256)));
    }

    Ok(versions)
}

pub async fn release_versions(forge: &dyn Forge, config: &PipelineConfig, repo: &Repo) -> Result<Vec<Version>, Error> {
    let releases = collect_pages(config.page_size, move |opts| forge.list_releases(&repo.owner, &repo.repo, opts)).await?;

    let mut versions = Vec::new();
    for release in releases {
        if release.draft || release.prerelease {
            continue;
        }

        let release_id = release.id;
        let attachments = collect_pages(config.page_size, move |opts| {
            forge.list_release_attachments(&repo.owner, &repo.repo, release_id, opts)
        })
        .await?;

        let mut docs = attachments.into_iter().filter(|a| a.name == DOCS_ARCHIVE);
        let Some(attachment) = docs.next() else {
            tracing::debug!(%repo, tag = %release.tag_name, "release has no {DOCS_ARCHIVE}");
            continue;
        };
        if docs.next().is_some() {
            tracing::warn!(%repo, tag = %release.tag_name, "release has several {DOCS_ARCHIVE} attachments, using the first");
        }

        let mut version = Version::new(release.tag_name, release.created_at, ContentHash::from_declared(&attachment.uuid));
        version.extra = BTreeMap::from([
            (RELEASE_ID.to_string(), release.id.to_string().into()),
            (RELEASE_ATTACHMENT_ID.to_string(), attachment.id.to_string().into()),
        ]);
        versions.push(version);
    }

    Ok(versions)
}

/// Rewrite the index of `repo` and enqueue a fetch for each version.
pub async fn discover(pipeline: &Pipeline, queue: &Queue<Task>, source: Source, repo: &Repo) -> Result<(), Error> {
    tracing::info!(%repo, %source, "discovering versions");

    let versions = list_versions(pipeline.forge(), pipeline.config(), source, repo).await?;
    let Some(index) = RepoIndex::from_versions(repo.clone(), versions) else {
        tracing::error!(%repo, %source, "no versions found, keeping previous index");
        return Ok(());
    };

    pipeline.db().repo_index().set(repo, &index).await?;
    tracing::info!(%repo, versions = index.versions.len(), latest = %index.latest.label, "index updated");

    for version in &index.versions {
        queue.submit(&Task::FetchVersion { source, repo: repo.clone(), version: version.clone() })?;
    }
    Ok(())
}
