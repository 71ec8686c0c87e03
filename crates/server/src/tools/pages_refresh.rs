//! pages_refresh tool implementation.
//!
//! Schedules a rediscovery of a repository, as a push notification from the
//! forge would. Safe to call repeatedly: concurrent requests collapse into
//! one discovery run.

use pagemirror_core::{AppConfig, Source};
use pagemirror_tasks::{Job, Queue, Task};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, repo_param};

/// Input parameters for pages_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesRefreshParams {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub repo: String,

    /// Publishing source override; defaults to the repository's configured source.
    #[serde(default)]
    pub source: Option<Source>,
}

/// Output structure for pages_refresh tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesRefreshOutput {
    pub queued: bool,
    pub source: Source,
    /// Queue the discovery task was submitted to.
    pub queue: String,
    /// Deduplication key of the task.
    pub key: String,
}

/// Implementation of the pages_refresh tool.
pub async fn refresh_impl(
    queue: &Queue<Task>, config: &AppConfig, params: PagesRefreshParams,
) -> Result<CallToolResult, McpError> {
    let repo = repo_param(&params.owner, &params.repo)?;
    let source = params.source.unwrap_or_else(|| config.source_for(&repo));

    let task = Task::Discover { source, repo };
    queue.submit(&task)?;
    tracing::info!(repo = %task.repo(), %source, "refresh requested");

    json_result(&PagesRefreshOutput {
        queued: true,
        source,
        queue: task.queue_name().to_string(),
        key: task.dedup_key(),
    })
}
