//! Forge API client.
//!
//! ### Endpoints
//!
//! - Branches: `GET /api/v1/repos/{owner}/{repo}/branches`
//! - Packages: `GET /api/v1/packages/{owner}` and `.../{type}/{name}/{version}/files`
//! - Releases: `GET /api/v1/repos/{owner}/{repo}/releases` and `.../{id}/assets`
//! - Archive: `GET /api/v1/repos/{owner}/{repo}/archive/{commit}.zip`
//! - Generic package file: `GET /api/packages/{owner}/generic/{name}/{version}/{file}`
//!
//! ### Authentication
//!
//! Every request carries `Authorization: token <admin token>` when a token
//! is configured. List endpoints are paginated; see [`pagination`].

pub mod error;
pub mod models;
pub mod pagination;

pub use error::ForgeError;
pub use models::{Attachment, Branch, BranchCommit, Package, PackageFile, Release};
pub use pagination::{ListOptions, Page, collect_pages};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::{Client, Response, header};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use url::Url;

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "pagemirror/0.1";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the forge client.
#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Forge base URL, e.g. `https://git.example.com`.
    pub base_url: String,
    /// Service-level token sent with every request.
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            token: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Everything the pipeline asks of the forge.
///
/// Implemented over HTTP by [`ForgeClient`]; tests substitute their own.
#[async_trait]
pub trait Forge: Send + Sync {
    async fn list_branches(&self, owner: &str, repo: &str, opts: ListOptions) -> Result<Page<Branch>, ForgeError>;

    /// Packages owned by `owner`.
    async fn list_packages(&self, owner: &str, opts: ListOptions) -> Result<Page<Package>, ForgeError>;

    async fn list_package_files(
        &self, owner: &str, kind: &str, name: &str, version: &str,
    ) -> Result<Vec<PackageFile>, ForgeError>;

    async fn list_releases(&self, owner: &str, repo: &str, opts: ListOptions) -> Result<Page<Release>, ForgeError>;

    async fn list_release_attachments(
        &self, owner: &str, repo: &str, release_id: i64, opts: ListOptions,
    ) -> Result<Page<Attachment>, ForgeError>;

    async fn get_release_attachment(
        &self, owner: &str, repo: &str, release_id: i64, attachment_id: i64,
    ) -> Result<Attachment, ForgeError>;

    /// Zip archive of the repository tree at `commit`.
    async fn archive(&self, owner: &str, repo: &str, commit: &str) -> Result<Bytes, ForgeError>;

    /// Stream a generic package file into `dest`, returning the bytes written.
    async fn download_package_file(
        &self, owner: &str, name: &str, version: &str, file: &str, dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ForgeError>;

    /// Stream an authenticated download URL into `dest`, returning the bytes written.
    async fn download(&self, url: &str, dest: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, ForgeError>;
}

/// HTTP forge client.
#[derive(Debug, Clone)]
pub struct ForgeClient {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl ForgeClient {
    /// Create a new forge client with the given configuration.
    pub fn new(config: ForgeConfig) -> Result<Self, ForgeError> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .build()?;

        let base = if config.base_url.ends_with('/') { config.base_url.clone() } else { format!("{}/", config.base_url) };
        let base_url = Url::parse(&base).map_err(|e| ForgeError::InvalidUrl(format!("{base}: {e}")))?;

        Ok(Self { http, base_url, token: config.token })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL from already-unescaped path segments.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ForgeError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| ForgeError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, url: Url) -> Result<Response, ForgeError> {
        let mut request = self.http.get(url.clone());
        if let Some(token) = &self.token {
            request = request.header(header::AUTHORIZATION, format!("token {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(%url, status = status.as_u16(), "forge response");

        if status == 401 || status == 403 {
            return Err(ForgeError::AuthError { status: status.as_u16() });
        }
        if !status.is_success() {
            return Err(ForgeError::HttpError { status: status.as_u16(), url: url.to_string() });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<(T, header::HeaderMap), ForgeError> {
        let response = self.send(url).await?;
        let headers = response.headers().clone();
        let bytes = response.bytes().await?;
        let value = serde_json::from_slice(&bytes).map_err(|e| ForgeError::Parse(e.to_string()))?;
        Ok((value, headers))
    }

    async fn get_page<T: DeserializeOwned>(&self, mut url: Url, opts: ListOptions) -> Result<Page<T>, ForgeError> {
        url.query_pairs_mut()
            .append_pair("page", &opts.page.to_string())
            .append_pair("limit", &opts.page_size.to_string());
        let (items, headers) = self.get_json(url).await?;
        Ok(Page { items, last_page: pagination::last_page(&headers) })
    }

    async fn stream_to(&self, url: Url, dest: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, ForgeError> {
        let response = self.send(url).await?;
        let expected = response.content_length();

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        if let Some(expected) = expected
            && expected != written
        {
            return Err(ForgeError::SizeMismatch { written, expected });
        }
        Ok(written)
    }
}

#[async_trait]
impl Forge for ForgeClient {
    async fn list_branches(&self, owner: &str, repo: &str, opts: ListOptions) -> Result<Page<Branch>, ForgeError> {
        let url = self.endpoint(&["api", "v1", "repos", owner, repo, "branches"])?;
        self.get_page(url, opts).await
    }

    async fn list_packages(&self, owner: &str, opts: ListOptions) -> Result<Page<Package>, ForgeError> {
        let mut url = self.endpoint(&["api", "v1", "packages", owner])?;
        url.query_pairs_mut().append_pair("type", "generic");
        self.get_page(url, opts).await
    }

    async fn list_package_files(
        &self, owner: &str, kind: &str, name: &str, version: &str,
    ) -> Result<Vec<PackageFile>, ForgeError> {
        let url = self.endpoint(&["api", "v1", "packages", owner, kind, name, version, "files"])?;
        let (files, _) = self.get_json(url).await?;
        Ok(files)
    }

    async fn list_releases(&self, owner: &str, repo: &str, opts: ListOptions) -> Result<Page<Release>, ForgeError> {
        let url = self.endpoint(&["api", "v1", "repos", owner, repo, "releases"])?;
        self.get_page(url, opts).await
    }

    async fn list_release_attachments(
        &self, owner: &str, repo: &str, release_id: i64, opts: ListOptions,
    ) -> Result<Page<Attachment>, ForgeError> {
        let id = release_id.to_string();
        let url = self.endpoint(&["api", "v1", "repos", owner, repo, "releases", &id, "assets"])?;
        self.get_page(url, opts).await
    }

    async fn get_release_attachment(
        &self, owner: &str, repo: &str, release_id: i64, attachment_id: i64,
    ) -> Result<Attachment, ForgeError> {
        let id = release_id.to_string();
        let asset = attachment_id.to_string();
        let url = self.endpoint(&["api", "v1", "repos", owner, repo, "releases", &id, "assets", &asset])?;
        let (attachment, _) = self.get_json(url).await?;
        Ok(attachment)
    }

    async fn archive(&self, owner: &str, repo: &str, commit: &str) -> Result<Bytes, ForgeError> {
        let archive = format!("{commit}.zip");
        let url = self.endpoint(&["api", "v1", "repos", owner, repo, "archive", &archive])?;
        let response = self.send(url).await?;
        Ok(response.bytes().await?)
    }

    async fn download_package_file(
        &self, owner: &str, name: &str, version: &str, file: &str, dest: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, ForgeError> {
        let url = self.endpoint(&["api", "packages", owner, "generic", name, version, file])?;
        self.stream_to(url, dest).await
    }

    async fn download(&self, url: &str, dest: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<u64, ForgeError> {
        let url = Url::parse(url).map_err(|e| ForgeError::InvalidUrl(format!("{url}: {e}")))?;
        self.stream_to(url, dest).await
    }
}
