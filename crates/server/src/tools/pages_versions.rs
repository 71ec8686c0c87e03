//! pages_versions tool implementation.
//!
//! Returns the stored version index of a repository.

use pagemirror_core::{Database, Error, RepoIndex};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{json_result, repo_param};

/// Parameters for the pages_versions tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesVersionsParams {
    /// Repository owner.
    pub owner: String,

    /// Repository name.
    pub repo: String,
}

/// Output from the pages_versions tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PagesVersionsOutput {
    pub index: RepoIndex,
    /// Whether each version's files are cached, in index order.
    pub cached: Vec<bool>,
}

/// Implementation of the pages_versions tool.
pub async fn versions_impl(db: &Database, params: PagesVersionsParams) -> Result<CallToolResult, McpError> {
    let repo = repo_param(&params.owner, &params.repo)?;
    let index = db
        .repo_index()
        .get(&repo)
        .await?
        .ok_or_else(|| Error::CacheMiss(repo.to_string()))?;

    let mut cached = Vec::with_capacity(index.versions.len());
    for version in &index.versions {
        cached.push(!version.hash.is_empty() && db.manifests().contains(&version.hash).await?);
    }

    json_result(&PagesVersionsOutput { index, cached })
}
