//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::{
    PagesOpenParams, PagesRefreshParams, PagesVersionsParams, open_impl, refresh_impl, versions_impl,
};

use pagemirror_core::{AppConfig, Database};
use pagemirror_tasks::{Queue, Task};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for pagemirror.
#[derive(Clone)]
pub struct PagemirrorServer {
    db: Database,
    queue: Queue<Task>,
    config: Arc<AppConfig>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl PagemirrorServer {
    /// Create a new server handler.
    pub fn new(db: Database, queue: Queue<Task>, config: Arc<AppConfig>) -> Self {
        Self { db, queue, config, tool_router: Self::tool_router() }
    }

    /// Read a file from a mirrored documentation version.
    ///
    /// Answers immediately. Uncached versions report `preparing` and are fetched in the background.
    #[tool(
        description = "Read a file from a repository's published documentation. Returns status 'ready' with the content, or 'preparing' if the version is still being mirrored (retry shortly)."
    )]
    async fn pages_open(&self, params: Parameters<PagesOpenParams>) -> Result<CallToolResult, McpError> {
        open_impl(&self.db, &self.queue, &self.config, params.0).await
    }

    /// Schedule rediscovery of a repository's versions.
    #[tool(description = "Re-list a repository's published documentation versions and mirror any new ones.")]
    async fn pages_refresh(&self, params: Parameters<PagesRefreshParams>) -> Result<CallToolResult, McpError> {
        refresh_impl(&self.queue, &self.config, params.0).await
    }

    /// Show the stored version index of a repository.
    #[tool(description = "List the known documentation versions of a repository, newest first, with cache state.")]
    async fn pages_versions(&self, params: Parameters<PagesVersionsParams>) -> Result<CallToolResult, McpError> {
        versions_impl(&self.db, params.0).await
    }
}

impl ServerHandler for PagemirrorServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "pagemirror".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Serves documentation published by forge repositories. Versions are mirrored lazily: \
                 a first read reports 'preparing' and starts the download."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
