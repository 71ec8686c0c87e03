//! The read path.
//!
//! Answers "give me this file of this version" from the store alone, and
//! when something is missing enqueues the task that will produce it. The
//! caller gets [`PageData::NotReady`] and is expected to retry later.

use pagemirror_core::types::page_path;
use pagemirror_core::{ContentHash, Database, Error, Repo, Source};

use crate::queue::Queue;
use crate::task::Task;

/// Result of a page lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageData {
    /// The file is cached.
    Ready { path: String, hash: ContentHash, bytes: Vec<u8> },
    /// Not cached yet; retry later.
    NotReady,
}

/// Resolve `path` within version `label` of `repo`.
///
/// An empty `label` means `latest`. An empty `path`, or one ending in `/`,
/// means the `index.html` of that directory.
///
/// # Errors
///
/// - [`Error::FileNotFound`] when the version is cached and lacks the path
/// - any store or enqueue failure
pub async fn resolve_page(
    db: &Database, queue: &Queue<Task>, source: Source, repo: &Repo, label: &str, path: &str,
) -> Result<PageData, Error> {
    let Some(index) = db.repo_index().get(repo).await? else {
        tracing::info!(%repo, %source, "repository not indexed, scheduling discovery");
        queue.submit(&Task::Discover { source, repo: repo.clone() })?;
        return Ok(PageData::NotReady);
    };

    let Some(version) = index.find(label) else {
        tracing::debug!(%repo, label, "unknown version label");
        return Ok(PageData::NotReady);
    };

    if version.hash.is_empty() {
        tracing::warn!(%repo, label = %version.label, "version has no content hash");
        return Ok(PageData::NotReady);
    }

    let Some(manifest) = db.manifests().get(&version.hash).await? else {
        tracing::info!(%repo, label = %version.label, hash = %version.hash, "version not cached, scheduling fetch");
        queue.submit(&Task::FetchVersion { source, repo: repo.clone(), version: version.clone() })?;
        return Ok(PageData::NotReady);
    };

    let path = page_path(path);
    let Some(hash) = manifest.find(&path) else {
        return Err(Error::FileNotFound(format!("{repo}@{}: {path}", version.label)));
    };

    match db.blobs().get(hash).await? {
        Some(bytes) => Ok(PageData::Ready { path, hash: hash.clone(), bytes }),
        None => {
            tracing::warn!(%repo, %path, %hash, "manifest references a missing blob");
            Ok(PageData::NotReady)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, PipelineConfig};
    use crate::task::{DISCOVER_BRANCHES, FETCH_BRANCHES, FETCH_PACKAGES};
    use crate::testing::{FakeForge, at, build_zip, settle};
    use pagemirror_client::{Branch, BranchCommit};
    use pagemirror_core::{Manifest, PageFile, RepoIndex, Version, hash_bytes};
    use std::sync::Arc;
    use std::time::Duration;

    fn repo() -> Repo {
        Repo::new("acme", "widgets")
    }

    fn branch(name: &str, id: &str, secs: i64) -> Branch {
        Branch { name: name.into(), commit: BranchCommit { id: id.into(), timestamp: at(secs) } }
    }

    async fn start(forge: &Arc<FakeForge>) -> (Database, Queue<Task>) {
        let db = Database::open_in_memory().await.unwrap();
        let queue = Pipeline::new(db.clone(), forge.clone(), PipelineConfig::default()).start(2);
        (db, queue)
    }

    async fn seed(db: &Database, version: Version, files: &[(&str, &str)]) {
        let index = RepoIndex::from_versions(repo(), vec![version.clone()]).unwrap();
        db.repo_index().set(&repo(), &index).await.unwrap();

        let mut manifest = Vec::new();
        for (name, bytes) in files {
            let hash = hash_bytes(bytes.as_bytes());
            db.blobs().set(&hash, &bytes.as_bytes().to_vec()).await.unwrap();
            manifest.push(PageFile { name: name.to_string(), hash });
        }
        db.manifests().set(&version.hash, &Manifest(manifest)).await.unwrap();
    }

    fn ready_bytes(data: PageData) -> Vec<u8> {
        match data {
            PageData::Ready { bytes, .. } => bytes,
            PageData::NotReady => panic!("expected a cached page"),
        }
    }

    #[tokio::test]
    async fn test_cold_repo_enqueues_discovery_once() {
        let forge = Arc::new(FakeForge::default());
        forge.set_branches(vec![branch("gh-pages", "aaa", 0)]);
        forge.set_archive("aaa", build_zip(&[("widgets-aaa/index.html", "hello")]));
        forge.hold();
        let (db, queue) = start(&forge).await;
        let repo = repo();

        let (a, b, c) = tokio::join!(
            resolve_page(&db, &queue, Source::Branches, &repo, "", ""),
            resolve_page(&db, &queue, Source::Branches, &repo, "", ""),
            resolve_page(&db, &queue, Source::Branches, &repo, "", ""),
        );
        for result in [a, b, c] {
            assert_eq!(result.unwrap(), PageData::NotReady);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        forge.release();
        settle(&queue).await;

        assert_eq!(forge.calls("list_branches"), 1);
        assert!(queue.ledger(DISCOVER_BRANCHES).unwrap().entry("fetch[acme/widgets]").is_some());

        let page = resolve_page(&db, &queue, Source::Branches, &repo, "", "").await.unwrap();
        assert_eq!(ready_bytes(page), b"hello");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_branch_discovery_end_to_end() {
        let forge = Arc::new(FakeForge::default());
        forge.set_branches(vec![branch("gh-pages", "aaa", 0), branch("gh-pages-v2", "bbb", 100), branch("main", "ccc", 50)]);
        forge.set_archive("aaa", build_zip(&[("widgets-aaa/index.html", "latest docs")]));
        forge.set_archive("bbb", build_zip(&[("widgets-bbb/guide/index.html", "v2 guide")]));
        let (db, queue) = start(&forge).await;

        assert_eq!(
            resolve_page(&db, &queue, Source::Branches, &repo(), "", "").await.unwrap(),
            PageData::NotReady
        );
        settle(&queue).await;

        let index = db.repo_index().get(&repo()).await.unwrap().unwrap();
        assert_eq!(index.latest.label, "latest");
        assert_eq!(index.versions.len(), 2);

        let latest = resolve_page(&db, &queue, Source::Branches, &repo(), "latest", "index.html").await.unwrap();
        assert_eq!(ready_bytes(latest), b"latest docs");

        let guide = resolve_page(&db, &queue, Source::Branches, &repo(), "v2", "guide/").await.unwrap();
        assert_eq!(ready_bytes(guide), b"v2 guide");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_discovery_keeps_index() {
        let forge = Arc::new(FakeForge::default());
        forge.set_branches(vec![branch("main", "ccc", 0)]);
        let (db, queue) = start(&forge).await;
        let version = Version::new("latest", at(0), hash_bytes(b"old"));
        seed(&db, version.clone(), &[("index.html", "old")]).await;

        queue.submit(&Task::Discover { source: Source::Branches, repo: repo() }).unwrap();
        settle(&queue).await;

        let index = db.repo_index().get(&repo()).await.unwrap().unwrap();
        assert_eq!(index.latest, version);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_cached_page_served() {
        let forge = Arc::new(FakeForge::default());
        let (db, queue) = start(&forge).await;
        let version = Version::new("v1", at(0), hash_bytes(b"v1"));
        seed(&db, version, &[("index.html", "root"), ("api/index.html", "api"), ("a.css", "css")]).await;

        let root = resolve_page(&db, &queue, Source::Branches, &repo(), "v1", "").await.unwrap();
        assert_eq!(ready_bytes(root), b"root");
        let api = resolve_page(&db, &queue, Source::Branches, &repo(), "", "api/").await.unwrap();
        assert_eq!(ready_bytes(api), b"api");
        let css = resolve_page(&db, &queue, Source::Branches, &repo(), "v1", "a.css").await.unwrap();
        assert_eq!(ready_bytes(css), b"css");
        assert_eq!(queue.pending(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_path_is_not_found() {
        let forge = Arc::new(FakeForge::default());
        let (db, queue) = start(&forge).await;
        seed(&db, Version::new("v1", at(0), hash_bytes(b"v1")), &[("index.html", "root")]).await;

        let result = resolve_page(&db, &queue, Source::Branches, &repo(), "v1", "nope.html").await;
        assert!(matches!(result, Err(Error::FileNotFound(_))));
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_label_enqueues_nothing() {
        let forge = Arc::new(FakeForge::default());
        let (db, queue) = start(&forge).await;
        seed(&db, Version::new("v1", at(0), hash_bytes(b"v1")), &[("index.html", "root")]).await;

        let result = resolve_page(&db, &queue, Source::Branches, &repo(), "v9", "").await.unwrap();
        assert_eq!(result, PageData::NotReady);
        settle(&queue).await;
        assert!(queue.ledger(DISCOVER_BRANCHES).unwrap().is_empty());
        assert!(queue.ledger(FETCH_BRANCHES).unwrap().is_empty());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_manifest_enqueues_fetch() {
        let forge = Arc::new(FakeForge::default());
        let archive = build_zip(&[("index.html", "pkg docs")]);
        forge.set_package_download("1.0.0", archive.clone());
        let (db, queue) = start(&forge).await;

        let version = Version::new("1.0.0", at(0), hash_bytes(&archive));
        let index = RepoIndex::from_versions(repo(), vec![version.clone()]).unwrap();
        db.repo_index().set(&repo(), &index).await.unwrap();

        let first = resolve_page(&db, &queue, Source::Packages, &repo(), "1.0.0", "").await.unwrap();
        assert_eq!(first, PageData::NotReady);
        settle(&queue).await;

        let key = format!("fetchVersion[{}]", version.hash);
        assert!(queue.ledger(FETCH_PACKAGES).unwrap().entry(&key).is_some());
        let second = resolve_page(&db, &queue, Source::Packages, &repo(), "1.0.0", "").await.unwrap();
        assert_eq!(ready_bytes(second), b"pkg docs");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_fetch_clears_ledger() {
        let forge = Arc::new(FakeForge::default());
        forge.set_package_download("1.0.0", build_zip(&[("index.html", "tampered")]));
        let (db, queue) = start(&forge).await;

        let version = Version::new("1.0.0", at(0), ContentHash::from_declared(&"0".repeat(64)));
        let index = RepoIndex::from_versions(repo(), vec![version.clone()]).unwrap();
        db.repo_index().set(&repo(), &index).await.unwrap();

        resolve_page(&db, &queue, Source::Packages, &repo(), "", "").await.unwrap();
        settle(&queue).await;

        assert!(!db.manifests().contains(&version.hash).await.unwrap());
        let key = format!("fetchVersion[{}]", version.hash);
        assert!(queue.ledger(FETCH_PACKAGES).unwrap().entry(&key).is_none());
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_missing_blob_is_not_ready() {
        let forge = Arc::new(FakeForge::default());
        let (db, queue) = start(&forge).await;
        let version = Version::new("v1", at(0), hash_bytes(b"v1"));
        seed(&db, version, &[("index.html", "root")]).await;
        db.blobs().delete(&hash_bytes(b"root")).await.unwrap();

        let result = resolve_page(&db, &queue, Source::Branches, &repo(), "v1", "").await.unwrap();
        assert_eq!(result, PageData::NotReady);
        queue.shutdown().await;
    }
}
