//! Archive extraction into the blob store.
//!
//! Entries are processed in parallel, at most `concurrency` at a time. Each
//! entry is read, hashed, stored as a blob under its hash, and recorded in the
//! manifest under its (optionally stripped) path. The first failure cancels
//! the remaining entries and no manifest is returned.

use std::io::{Read, Seek};
use std::sync::{Arc, Mutex, PoisonError};

use pagemirror_core::store::{Raw, Typed};
use pagemirror_core::{ContentHash, Error, Manifest, PageFile, hash_bytes};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zip::ZipArchive;

type Blobs = Typed<ContentHash, Vec<u8>, Raw>;

/// Upper bound for the read buffer preallocated from an entry header.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Leading path components removed from every entry name.
    pub strip_components: usize,
    /// Entries extracted at once.
    pub concurrency: usize,
}

/// Drop everything up to and including the `n`-th `/` of `name`.
///
/// An entry with fewer than `n` separators sits beside the stripped root
/// rather than inside it and keeps its full name. Returns `None` when nothing
/// remains, as for the root directory itself.
pub fn strip_components(name: &str, n: usize) -> Option<&str> {
    let rest = match n.checked_sub(1) {
        Some(nth) => name.match_indices('/').nth(nth).map_or(name, |(idx, _)| &name[idx + 1..]),
        None => name,
    };
    if rest.is_empty() { None } else { Some(rest) }
}

fn archive_error(e: impl std::fmt::Display) -> Error {
    Error::Archive(e.to_string())
}

/// Extract every file in `archive` into `blobs` and return the manifest.
///
/// Each worker reads through its own clone of `archive`, so the reader must
/// keep an independent position per clone: a `Cursor` over shared bytes, or a
/// [`SpoolReader`](crate::spool::SpoolReader) over a downloaded file.
///
/// # Errors
///
/// Fails with [`Error::Archive`] if the archive cannot be opened or an entry
/// cannot be read, or with the store's error if a blob write fails. Blobs
/// written before the failure stay in the store.
pub async fn extract_archive<R>(blobs: &Blobs, archive: R, opts: ExtractOptions) -> Result<Manifest, Error>
where
    R: Read + Seek + Clone + Send + Sync + 'static,
{
    let zip = tokio::task::spawn_blocking(move || ZipArchive::new(archive))
        .await
        .map_err(archive_error)?
        .map_err(archive_error)?;

    tracing::debug!(entries = zip.len(), strip = opts.strip_components, "extracting archive");

    let semaphore = Arc::new(Semaphore::new(opts.concurrency.max(1)));
    let files = Arc::new(Mutex::new(Vec::with_capacity(zip.len())));
    let mut join_set = JoinSet::new();

    for index in 0..zip.len() {
        let zip = zip.clone();
        let blobs = blobs.clone();
        let semaphore = semaphore.clone();
        let files = files.clone();

        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.map_err(archive_error)?;
            let file = extract_entry(zip, index, &blobs, opts.strip_components).await?;
            if let Some(file) = file {
                files.lock().unwrap_or_else(PoisonError::into_inner).push(file);
            }
            Ok::<_, Error>(())
        });
    }

    while let Some(joined) = join_set.join_next().await {
        let result = joined.map_err(archive_error).and_then(|r| r);
        if let Err(e) = result {
            join_set.shutdown().await;
            tracing::error!(error = %e, "archive extraction failed");
            return Err(e);
        }
    }

    let files = std::mem::take(&mut *files.lock().unwrap_or_else(PoisonError::into_inner));
    tracing::info!(files = files.len(), "archive extracted");
    Ok(Manifest(files))
}

async fn extract_entry<R>(
    mut zip: ZipArchive<R>, index: usize, blobs: &Blobs, strip: usize,
) -> Result<Option<PageFile>, Error>
where
    R: Read + Seek + Send + 'static,
{
    let entry = tokio::task::spawn_blocking(move || -> Result<Option<(String, Vec<u8>)>, Error> {
        let mut entry = zip.by_index(index).map_err(archive_error)?;
        if entry.is_dir() {
            return Ok(None);
        }
        let name = entry.name().to_string();
        let mut data = Vec::with_capacity(entry.size().min(MAX_PREALLOC) as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| Error::Archive(format!("{name}: {e}")))?;
        Ok(Some((name, data)))
    })
    .await
    .map_err(archive_error)??;

    let Some((name, data)) = entry else {
        return Ok(None);
    };

    let Some(path) = strip_components(&name, strip) else {
        tracing::info!(entry = %name, strip, "dropping entry with no path left after stripping");
        return Ok(None);
    };

    let hash = hash_bytes(&data);
    blobs.set(&hash, &data).await?;
    tracing::debug!(path, %hash, size = data.len(), "stored entry");

    Ok(Some(PageFile { name: path.to_string(), hash }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pagemirror_core::store::{MemoryStore, Store};
    use crate::spool;
    use crate::testing::build_zip;
    use bytes::Bytes;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn opts(strip_components: usize) -> ExtractOptions {
        ExtractOptions { strip_components, concurrency: 5 }
    }

    /// Blob store that fails the n-th write and counts writes in flight.
    struct Flaky {
        inner: MemoryStore,
        fail_on: usize,
        writes: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Flaky {
        fn new(fail_on: usize) -> Self {
            Self {
                inner: MemoryStore::new("blobs"),
                fail_on,
                writes: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Store for Flaky {
        async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), Error> {
            self.inner.delete(key).await
        }

        async fn close(&self) -> Result<(), Error> {
            self.inner.close().await
        }
    }

    #[test]
    fn test_strip_components() {
        assert_eq!(strip_components("repo-abc/index.html", 1), Some("index.html"));
        assert_eq!(strip_components("repo-abc/css/site.css", 1), Some("css/site.css"));
        assert_eq!(strip_components("index.html", 0), Some("index.html"));
        assert_eq!(strip_components("repo-abc/", 1), None);
        assert_eq!(strip_components("repo-abc/docs/", 1), Some("docs/"));
        assert_eq!(strip_components("a/b/c.html", 2), Some("c.html"));
        assert_eq!(strip_components("", 0), None);
        assert_eq!(strip_components("", 1), None);
    }

    #[test]
    fn test_strip_keeps_entries_beside_the_root() {
        assert_eq!(strip_components("README", 1), Some("README"));
        assert_eq!(strip_components("a/b", 2), Some("a/b"));
    }

    #[tokio::test]
    async fn test_root_level_file_survives_stripping() {
        let blobs: Blobs = Typed::new(Arc::new(MemoryStore::new("blobs")));
        let archive = build_zip(&[("README", "readme"), ("w-abc/index.html", "home")]);

        let mut manifest = extract_archive(&blobs, Cursor::new(archive), opts(1)).await.unwrap();
        manifest.0.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<_> = manifest.0.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["README", "index.html"]);
    }

    #[tokio::test]
    async fn test_extract_with_strip() {
        let blobs: Blobs = Typed::new(Arc::new(MemoryStore::new("blobs")));
        let archive = build_zip(&[
            ("widgets-abc/", ""),
            ("widgets-abc/index.html", "<h1>home</h1>"),
            ("widgets-abc/guide/intro.html", "<p>intro</p>"),
        ]);

        let mut manifest = extract_archive(&blobs, Cursor::new(archive), opts(1)).await.unwrap();
        manifest.0.sort_by(|a, b| a.name.cmp(&b.name));

        let names: Vec<_> = manifest.0.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["guide/intro.html", "index.html"]);

        let hash = manifest.find("index.html").unwrap();
        assert_eq!(*hash, hash_bytes(b"<h1>home</h1>"));
        assert_eq!(blobs.get(hash).await.unwrap().unwrap(), b"<h1>home</h1>");
    }

    #[tokio::test]
    async fn test_identical_files_share_a_blob() {
        let store = Arc::new(MemoryStore::new("blobs"));
        let blobs: Blobs = Typed::new(store.clone());
        let archive = build_zip(&[("a.css", "body{}"), ("b.css", "body{}")]);

        let manifest = extract_archive(&blobs, Cursor::new(archive), opts(0)).await.unwrap();
        assert_eq!(manifest.len(), 2);
        assert_eq!(manifest.find("a.css"), manifest.find("b.css"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_extraction() {
        let store = Arc::new(Flaky::new(2));
        let blobs: Blobs = Typed::new(store.clone());
        let entries: Vec<(String, String)> = (0..20).map(|i| (format!("page{i}.html"), format!("page {i}"))).collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();

        let result = extract_archive(&blobs, Cursor::new(build_zip(&refs)), opts(0)).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(Flaky::new(usize::MAX));
        let blobs: Blobs = Typed::new(store.clone());
        let entries: Vec<(String, String)> = (0..30).map(|i| (format!("p{i}"), format!("body {i}"))).collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();

        let manifest = extract_archive(&blobs, Cursor::new(build_zip(&refs)), ExtractOptions { strip_components: 0, concurrency: 3 })
            .await
            .unwrap();
        assert_eq!(manifest.len(), 30);
        assert!(store.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_corrupt_archive() {
        let blobs: Blobs = Typed::new(Arc::new(MemoryStore::new("blobs")));
        let result = extract_archive(&blobs, Cursor::new(Bytes::from_static(b"not a zip")), opts(0)).await;
        assert!(matches!(result, Err(Error::Archive(_))));
    }

    #[tokio::test]
    async fn test_extract_from_spooled_file() {
        use tokio::io::AsyncWriteExt;

        let blobs: Blobs = Typed::new(Arc::new(MemoryStore::new("blobs")));
        let entries: Vec<(String, String)> = (0..12).map(|i| (format!("p{i}.html"), format!("page {i}"))).collect();
        let refs: Vec<(&str, &str)> = entries.iter().map(|(n, d)| (n.as_str(), d.as_str())).collect();

        let mut file = spool::create().unwrap();
        file.write_all(&build_zip(&refs)).await.unwrap();
        let reader = spool::finish(file).await.unwrap();

        let manifest = extract_archive(&blobs, reader, opts(0)).await.unwrap();
        assert_eq!(manifest.len(), 12);
        let hash = manifest.find("p7.html").unwrap();
        assert_eq!(blobs.get(hash).await.unwrap().unwrap(), b"page 7");
    }
}
