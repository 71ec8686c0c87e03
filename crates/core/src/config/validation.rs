//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use crate::types::Repo;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `timeout_ms` is less than 100ms or exceeds 10 minutes
    /// - `workers_per_queue` is outside 1..=32
    /// - `extract_concurrency` is outside 1..=64
    /// - `page_size` is outside 1..=1000
    /// - `forge_url`, `user_agent`, `pages_branch` or `pages_branch_prefix` is empty
    /// - a `sources` key is not of the form `owner/repo`
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 600_000 {
            return Err(invalid("timeout_ms", "must not exceed 10 minutes (600000ms)"));
        }

        if !(1..=32).contains(&self.workers_per_queue) {
            return Err(invalid("workers_per_queue", "must be between 1 and 32"));
        }
        if !(1..=64).contains(&self.extract_concurrency) {
            return Err(invalid("extract_concurrency", "must be between 1 and 64"));
        }
        if !(1..=1000).contains(&self.page_size) {
            return Err(invalid("page_size", "must be between 1 and 1000"));
        }

        if self.forge_url.is_empty() {
            return Err(invalid("forge_url", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }
        if self.pages_branch.is_empty() {
            return Err(invalid("pages_branch", "must not be empty"));
        }
        if self.pages_branch_prefix.is_empty() {
            return Err(invalid("pages_branch_prefix", "must not be empty"));
        }

        for key in self.sources.keys() {
            if key.parse::<Repo>().is_err() {
                return Err(invalid("sources", format!("{key:?} is not owner/repo")));
            }
        }

        if self.admin_token.is_none() {
            tracing::warn!("admin_token is not set; package and release downloads will fail");
        }

        Ok(())
    }
}
