//! Version fetch: download one version's archive and unpack it into the store.
//!
//! The manifest is written last, and only when every entry was stored, so a
//! manifest in the store always points at a complete set of blobs. A version
//! whose manifest already exists is never fetched again.

use std::io::{self, Cursor};

use pagemirror_client::Forge;
use pagemirror_core::types::{DOCS_ARCHIVE, RELEASE_ATTACHMENT_ID, RELEASE_ID};
use pagemirror_core::{Error, Repo, Source, Version, hash_reader};

use crate::extract::{ExtractOptions, extract_archive};
use crate::pipeline::Pipeline;
use crate::spool::{self, SpoolReader};

/// Fetch `version` of `repo` from `source` unless it is already cached.
pub async fn fetch_version(pipeline: &Pipeline, source: Source, repo: &Repo, version: &Version) -> Result<(), Error> {
    if version.hash.is_empty() {
        return Err(Error::Configuration(format!("version {} of {repo} has no content hash", version.label)));
    }

    let manifests = pipeline.db().manifests();
    if manifests.contains(&version.hash).await? {
        tracing::info!(%repo, version = %version.label, hash = %version.hash, "version already fetched");
        return Ok(());
    }

    tracing::info!(%repo, %source, version = %version.label, hash = %version.hash, "fetching version");

    let forge = pipeline.forge();
    let blobs = pipeline.db().blobs();
    let concurrency = pipeline.config().extract_concurrency;
    let manifest = match source {
        Source::Branches => {
            let archive = forge.archive(&repo.owner, &repo.repo, version.hash.as_str()).await?;
            // Forge archives wrap everything in a `<repo>-<commit>/` directory.
            let opts = ExtractOptions { strip_components: 1, concurrency };
            extract_archive(blobs, Cursor::new(archive), opts).await?
        }
        Source::Packages => {
            let archive = package_archive(forge, repo, version).await?;
            extract_archive(blobs, archive, ExtractOptions { strip_components: 0, concurrency }).await?
        }
        Source::Releases => {
            let archive = release_archive(forge, repo, version).await?;
            extract_archive(blobs, archive, ExtractOptions { strip_components: 0, concurrency }).await?
        }
    };

    manifests.set(&version.hash, &manifest).await?;
    tracing::info!(%repo, version = %version.label, files = manifest.len(), "version cached");
    Ok(())
}

/// Download the package's `docs.zip` and check it against the declared hash.
async fn package_archive(forge: &dyn Forge, repo: &Repo, version: &Version) -> Result<SpoolReader, Error> {
    let mut file = spool::create()?;
    let written = forge
        .download_package_file(&repo.owner, &repo.repo, &version.label, DOCS_ARCHIVE, &mut file)
        .await?;
    let archive = spooled(file, written).await?;
    tracing::debug!(%repo, version = %version.label, written, "package archive spooled");

    let reader = archive.clone();
    let actual = tokio::task::spawn_blocking(move || hash_reader(reader))
        .await
        .map_err(io::Error::other)??;
    if actual != version.hash {
        tracing::error!(%repo, version = %version.label, expected = %version.hash, %actual, "package archive hash mismatch");
        return Err(Error::Integrity { expected: version.hash.to_string(), actual: actual.to_string() });
    }
    Ok(archive)
}

/// Download the release's `docs.zip` attachment.
///
/// The hash of a release version is the attachment UUID, so there is nothing
/// to verify the bytes against.
async fn release_archive(forge: &dyn Forge, repo: &Repo, version: &Version) -> Result<SpoolReader, Error> {
    let release_id = version.extra_id(RELEASE_ID)?;
    let attachment_id = version.extra_id(RELEASE_ATTACHMENT_ID)?;

    let attachment = forge
        .get_release_attachment(&repo.owner, &repo.repo, release_id, attachment_id)
        .await?;

    let mut file = spool::create()?;
    let written = forge.download(&attachment.browser_download_url, &mut file).await?;
    tracing::debug!(%repo, version = %version.label, written, "release archive spooled");
    spooled(file, written).await
}

async fn spooled(file: tokio::fs::File, written: u64) -> Result<SpoolReader, Error> {
    let reader = spool::finish(file).await?;
    if reader.size() != written {
        return Err(Error::Io(io::Error::other(format!(
            "spool file holds {} bytes, {written} were downloaded",
            reader.size()
        ))));
    }
    Ok(reader)
}
