//! Client code for pagemirror.
//!
//! This crate provides the forge API client used by the discovery and
//! fetch tasks: paginated listings, archive download, and authenticated
//! streaming downloads.

pub mod forge;

pub use forge::{
    Attachment, Branch, BranchCommit, Forge, ForgeClient, ForgeConfig, ForgeError, ListOptions, Package, PackageFile,
    Page, Release, collect_pages,
};
