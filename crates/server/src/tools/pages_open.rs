//! pages_open tool implementation.
//!
//! Reads one file of a mirrored documentation version. Never waits on the
//! forge: an uncached version reports `preparing` and is fetched in the
//! background.

use pagemirror_core::{AppConfig, Database, Source};
use pagemirror_tasks::{PageData, Queue, Task, resolve_page};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, repo_param};

/// Input parameters for pages_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesOpenParams {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Version label; empty or omitted means `latest`.
    #[serde(default)]
    pub version: String,

    /// File path within the version; empty or a trailing `/` means `index.html`.
    #[serde(default)]
    pub path: String,

    /// Publishing source override; defaults to the repository's configured source.
    #[serde(default)]
    pub source: Option<Source>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Ready,
    /// Not cached yet; call again shortly.
    Preparing,
}

/// Output structure for pages_open tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesOpenOutput {
    pub status: PageStatus,
    pub owner: String,
    pub repo: String,
    pub version: String,
    /// Resolved file path, set once ready.
    pub path: Option<String>,
    /// Content hash of the file.
    pub hash: Option<String>,
    pub size: Option<usize>,
    /// UTF-8 file content; absent for binary files.
    pub content: Option<String>,
}

/// Implementation of the pages_open tool.
pub async fn open_impl(
    db: &Database, queue: &Queue<Task>, config: &AppConfig, params: PagesOpenParams,
) -> Result<CallToolResult, McpError> {
    let repo = repo_param(&params.owner, &params.repo)?;
    let source = params.source.unwrap_or_else(|| config.source_for(&repo));

    let data = resolve_page(db, queue, source, &repo, &params.version, &params.path).await?;

    let mut output = PagesOpenOutput {
        status: PageStatus::Preparing,
        owner: repo.owner.clone(),
        repo: repo.repo.clone(),
        version: params.version,
        path: None,
        hash: None,
        size: None,
        content: None,
    };

    if let PageData::Ready { path, hash, bytes } = data {
        output.status = PageStatus::Ready;
        output.size = Some(bytes.len());
        output.content = String::from_utf8(bytes).ok();
        output.path = Some(path);
        output.hash = Some(hash.to_string());
    } else {
        tracing::debug!(%repo, %source, "page not ready");
    }

    json_result(&output)
}
