//! The fetch-and-cache pipeline for pagemirror.
//!
//! This crate provides:
//! - A deduplicating work queue ([`queue`], [`ledger`])
//! - The pipeline tasks and their runner ([`task`], [`pipeline`])
//! - Version discovery for branches, packages and releases ([`discovery`])
//! - Version fetch, download spooling and archive extraction ([`fetch`], [`spool`], [`extract`])
//! - The read path serving cached pages ([`resolve`])

pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod ledger;
pub mod pipeline;
pub mod queue;
pub mod resolve;
pub mod spool;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use ledger::{Admission, DedupLedger};
pub use pipeline::{Pipeline, PipelineConfig};
pub use queue::{Job, Queue, Runner};
pub use resolve::{PageData, resolve_page};
pub use task::Task;
