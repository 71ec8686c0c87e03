//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PAGEMIRROR_*)
//! 2. TOML config file (if PAGEMIRROR_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::types::{Repo, Source};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PAGEMIRROR_*)
/// 2. TOML config file (if PAGEMIRROR_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite database holding every persistent namespace.
    ///
    /// Set via PAGEMIRROR_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the forge.
    ///
    /// Set via PAGEMIRROR_FORGE_URL environment variable.
    #[serde(default = "default_forge_url")]
    pub forge_url: String,

    /// Service-level token used for listing and downloads.
    ///
    /// Set via PAGEMIRROR_ADMIN_TOKEN environment variable.
    /// Package and release downloads fail without it.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// User-Agent string for forge requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Publishing source for repositories without an entry in `sources`.
    #[serde(default)]
    pub default_source: Source,

    /// Per-repository publishing source, keyed by `owner/repo`.
    #[serde(default)]
    pub sources: HashMap<String, Source>,

    /// Concurrent workers for each task queue.
    #[serde(default = "default_workers_per_queue")]
    pub workers_per_queue: usize,

    /// Archive entries extracted concurrently within one fetch.
    #[serde(default = "default_extract_concurrency")]
    pub extract_concurrency: usize,

    /// Page size for forge list endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Branch published as the `latest` version.
    #[serde(default = "default_pages_branch")]
    pub pages_branch: String,

    /// Prefix of branches published as labelled versions.
    #[serde(default = "default_pages_branch_prefix")]
    pub pages_branch_prefix: String,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./pagemirror.sqlite")
}

fn default_forge_url() -> String {
    "http://localhost:3000".into()
}

fn default_user_agent() -> String {
    "pagemirror/0.1".into()
}

fn default_timeout_ms() -> u64 {
    60_000
}

fn default_workers_per_queue() -> usize {
    2
}

fn default_extract_concurrency() -> usize {
    5
}

fn default_page_size() -> u32 {
    100
}

fn default_pages_branch() -> String {
    "gh-pages".into()
}

fn default_pages_branch_prefix() -> String {
    "gh-pages-".into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            forge_url: default_forge_url(),
            admin_token: None,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            default_source: Source::default(),
            sources: HashMap::new(),
            workers_per_queue: default_workers_per_queue(),
            extract_concurrency: default_extract_concurrency(),
            page_size: default_page_size(),
            pages_branch: default_pages_branch(),
            pages_branch_prefix: default_pages_branch_prefix(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Publishing source configured for a repository.
    pub fn source_for(&self, repo: &Repo) -> Source {
        self.sources
            .get(&repo.to_string())
            .copied()
            .unwrap_or(self.default_source)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered provider stack used by [`AppConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PAGEMIRROR_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("PAGEMIRROR_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Extract and validate a configuration from a provider stack.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
