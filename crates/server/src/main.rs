//! pagemirror server entry point.
//!
//! Boots the fetch pipeline and the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use pagemirror_client::{ForgeClient, ForgeConfig};
use pagemirror_core::{AppConfig, Database};
use pagemirror_tasks::{Pipeline, PipelineConfig};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(db = %config.db_path.display(), "Starting pagemirror on stdio transport");

    let db = Database::open(&config.db_path).await?;
    let forge = ForgeClient::new(ForgeConfig {
        base_url: config.forge_url.clone(),
        token: config.admin_token.clone(),
        user_agent: config.user_agent.clone(),
        timeout: config.timeout(),
    })?;
    tracing::info!(forge = %forge.base_url(), authenticated = config.admin_token.is_some(), "forge client ready");

    let pipeline = Pipeline::new(db.clone(), Arc::new(forge), PipelineConfig::from(&config));
    let queue = pipeline.start(config.workers_per_queue);

    let handler = handler::PagemirrorServer::new(db.clone(), queue.clone(), Arc::new(config));
    let server = serve_server(handler, stdio()).await?;

    server.waiting().await?;

    tracing::info!("Transport closed, draining queue");
    queue.shutdown().await;
    db.close().await?;

    Ok(())
}
