//! Core types and shared functionality for pagemirror.
//!
//! This crate provides:
//! - The data model (repositories, versions, indexes, manifests)
//! - Content hashing
//! - The key-value `Store` contract with SQLite and in-memory backends
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod database;
pub mod error;
pub mod hash;
pub mod store;
pub mod types;

pub use config::{AppConfig, ConfigError};
pub use database::Database;
pub use error::Error;
pub use hash::{ContentHash, hash_bytes, hash_reader};
pub use types::{Manifest, PageFile, Repo, RepoIndex, Source, Version};
