//! MCP tool implementations.
//!
//! This module contains all tools exposed by the pagemirror server.

pub mod pages_open;
pub mod pages_refresh;
pub mod pages_versions;

pub use pages_open::{PagesOpenParams, open_impl};
pub use pages_refresh::{PagesRefreshParams, refresh_impl};
pub use pages_versions::{PagesVersionsParams, versions_impl};

use pagemirror_core::{Error, Repo};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

/// Validate an `owner`/`repo` parameter pair.
pub(crate) fn repo_param(owner: &str, repo: &str) -> Result<Repo, Error> {
    let owner = owner.trim();
    let repo = repo.trim();
    if owner.is_empty() || repo.is_empty() {
        return Err(Error::InvalidInput("owner and repo cannot be empty".into()));
    }
    if owner.contains('/') || repo.contains('/') {
        return Err(Error::InvalidInput(format!("invalid repository name: {owner}/{repo}")));
    }
    Ok(Repo::new(owner, repo))
}

/// Render a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
