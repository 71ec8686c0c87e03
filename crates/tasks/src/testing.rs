//! Test fixtures: an in-memory forge and archive builders.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use pagemirror_client::{
    Attachment, Branch, Forge, ForgeError, ListOptions, Package, PackageFile, Page, Release,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Semaphore;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use crate::queue::{Job, Queue};

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

/// Zip `(name, contents)` pairs; names ending in `/` become directories.
pub fn build_zip(entries: &[(&str, &str)]) -> Bytes {
    zip_with(entries, SimpleFileOptions::default())
}

/// Like [`build_zip`], but file contents are stored uncompressed.
pub fn build_stored_zip(entries: &[(&str, &str)]) -> Bytes {
    zip_with(entries, SimpleFileOptions::default().compression_method(CompressionMethod::Stored))
}

fn zip_with(entries: &[(&str, &str)], options: SimpleFileOptions) -> Bytes {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
    }
    Bytes::from(writer.finish().unwrap().into_inner())
}

pub async fn settle<J: Job>(queue: &Queue<J>) {
    tokio::time::timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .expect("queue did not go idle");
}

#[derive(Default)]
struct State {
    branches: Vec<Branch>,
    packages: Vec<Package>,
    package_files: HashMap<String, Vec<PackageFile>>,
    releases: Vec<Release>,
    attachments: HashMap<i64, Vec<Attachment>>,
    archives: HashMap<String, Bytes>,
    package_downloads: HashMap<String, Bytes>,
    downloads: HashMap<String, Bytes>,
    calls: HashMap<&'static str, usize>,
    fail_listing: bool,
}

/// Forge double serving canned data. `hold` parks every call until `release`.
#[derive(Default)]
pub struct FakeForge {
    state: Mutex<State>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

fn not_found(what: impl std::fmt::Display) -> ForgeError {
    ForgeError::HttpError { status: 404, url: what.to_string() }
}

fn paginate<T: Clone>(items: &[T], opts: ListOptions) -> Page<T> {
    let size = opts.page_size.max(1) as usize;
    let start = (opts.page.max(1) as usize - 1) * size;
    let page = items.iter().skip(start).take(size).cloned().collect();
    let last_page = items.len().div_ceil(size) as u32;
    Page { items: page, last_page }
}

impl FakeForge {
    pub fn set_branches(&self, branches: Vec<Branch>) {
        self.state.lock().unwrap().branches = branches;
    }

    pub fn set_packages(&self, packages: Vec<Package>) {
        self.state.lock().unwrap().packages = packages;
    }

    pub fn set_package_files(&self, version: &str, files: Vec<PackageFile>) {
        self.state.lock().unwrap().package_files.insert(version.to_string(), files);
    }

    pub fn set_releases(&self, releases: Vec<Release>) {
        self.state.lock().unwrap().releases = releases;
    }

    pub fn set_attachments(&self, release_id: i64, attachments: Vec<Attachment>) {
        self.state.lock().unwrap().attachments.insert(release_id, attachments);
    }

    pub fn set_archive(&self, commit: &str, archive: Bytes) {
        self.state.lock().unwrap().archives.insert(commit.to_string(), archive);
    }

    pub fn set_package_download(&self, version: &str, archive: Bytes) {
        self.state.lock().unwrap().package_downloads.insert(version.to_string(), archive);
    }

    pub fn set_download(&self, url: &str, archive: Bytes) {
        self.state.lock().unwrap().downloads.insert(url.to_string(), archive);
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().unwrap().calls.get(method).copied().unwrap_or(0)
    }

    pub fn hold(&self) {
        *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = self.gate.lock().unwrap().take() {
            gate.close();
        }
    }

    async fn enter(&self, method: &'static str) -> Result<(), ForgeError> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            // Closing the semaphore is what releases held calls.
            let _ = gate.acquire().await;
        }

        let mut state = self.state.lock().unwrap();
        *state.calls.entry(method).or_default() += 1;
        if state.fail_listing && method.starts_with("list") {
            return Err(ForgeError::HttpError { status: 500, url: method.to_string() });
        }
        Ok(())
    }

    fn body(&self, pick: impl FnOnce(&State) -> Option<Bytes>, what: &str) -> Result<Bytes, ForgeError> {
        pick(&self.state.lock().unwrap()).ok_or_else(|| not_found(what))
    }
}

async fn write_body(body: Bytes, dest: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, ForgeError> {
    dest.write_all(&body).await?;
    dest.flush().await?;
    Ok(body.len() as u64)
}

#[async_trait]
impl Forge for FakeForge {
    async fn list_branches(&self, _owner: &str, _repo: &str, opts: ListOptions) -> Result<Page<Branch>, ForgeError> {
        self.enter("list_branches").await?;
        Ok(paginate(&self.state.lock().unwrap().branches, opts))
    }

    async fn list_packages(&self, _owner: &str, opts: ListOptions) -> Result<Page<Package>, ForgeError> {
        self.enter("list_packages").await?;
        Ok(paginate(&self.state.lock().unwrap().packages, opts))
    }

    async fn list_package_files(
        &self, _owner: &str, _kind: &str, _name: &str, version: &str,
    ) -> Result<Vec<PackageFile>, ForgeError> {
        self.enter("list_package_files").await?;
        Ok(self.state.lock().unwrap().package_files.get(version).cloned().unwrap_or_default())
    }

    async fn list_releases(&self, _owner: &str, _repo: &str, opts: ListOptions) -> Result<Page<Release>, ForgeError> {
        self.enter("list_releases").await?;
        Ok(paginate(&self.state.lock().unwrap().releases, opts))
    }

    async fn list_release_attachments(
        &self, _owner: &str, _repo: &str, release_id: i64, opts: ListOptions,
    ) -> Result<Page<Attachment>, ForgeError> {
        self.enter("list_release_attachments").await?;
        let state = self.state.lock().unwrap();
        let attachments = state.attachments.get(&release_id).ok_or_else(|| not_found(release_id))?;
        Ok(paginate(attachments, opts))
    }

    async fn get_release_attachment(
        &self, _owner: &str, _repo: &str, release_id: i64, attachment_id: i64,
    ) -> Result<Attachment, ForgeError> {
        self.enter("get_release_attachment").await?;
        let state = self.state.lock().unwrap();
        state
            .attachments
            .get(&release_id)
            .and_then(|list| list.iter().find(|a| a.id == attachment_id))
            .cloned()
            .ok_or_else(|| not_found(attachment_id))
    }

    async fn archive(&self, _owner: &str, _repo: &str, commit: &str) -> Result<Bytes, ForgeError> {
        self.enter("archive").await?;
        self.body(|s| s.archives.get(commit).cloned(), commit)
    }

    async fn download_package_file(
        &self, _owner: &str, _name: &str, version: &str, _file: &str, dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ForgeError> {
        self.enter("download_package_file").await?;
        let body = self.body(|s| s.package_downloads.get(version).cloned(), version)?;
        write_body(body, dest).await
    }

    async fn download(&self, url: &str, dest: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, ForgeError> {
        self.enter("download").await?;
        let body = self.body(|s| s.downloads.get(url).cloned(), url)?;
        write_body(body, dest).await
    }
}
