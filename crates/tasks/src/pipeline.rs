//! The task runner wiring discovery and fetch to the store and the forge.

use std::sync::Arc;

use async_trait::async_trait;
use pagemirror_client::Forge;
use pagemirror_core::{AppConfig, Database, Error};

use crate::queue::{Queue, Runner};
use crate::task::{QUEUES, Task};
use crate::{discovery, fetch};

/// Knobs of the discovery and fetch steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Page size for forge list calls.
    pub page_size: u32,
    /// Archive entries extracted at once.
    pub extract_concurrency: usize,
    /// Branch published as `latest`.
    pub pages_branch: String,
    /// Prefix of labelled version branches.
    pub pages_branch_prefix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            extract_concurrency: config.extract_concurrency,
            pages_branch: config.pages_branch.clone(),
            pages_branch_prefix: config.pages_branch_prefix.clone(),
        }
    }
}

/// Runs [`Task`]s against a database and a forge.
pub struct Pipeline {
    db: Database,
    forge: Arc<dyn Forge>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(db: Database, forge: Arc<dyn Forge>, config: PipelineConfig) -> Self {
        Self { db, forge, config }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn forge(&self) -> &dyn Forge {
        self.forge.as_ref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start every pipeline lane with this runner.
    pub fn start(self, workers_per_queue: usize) -> Queue<Task> {
        Queue::<Task>::start(&QUEUES, workers_per_queue, Arc::new(self))
    }
}

#[async_trait]
impl Runner<Task> for Pipeline {
    async fn run(&self, task: Task, queue: &Queue<Task>) -> Result<(), Error> {
        match task {
            Task::Discover { source, repo } => discovery::discover(self, queue, source, &repo).await,
            Task::FetchVersion { source, repo, version } => fetch::fetch_version(self, source, &repo, &version).await,
        }
    }
}
