//! The five namespaces the server works with.
//!
//! | Namespace    | Key              | Value          | Backend |
//! |--------------|------------------|----------------|---------|
//! | sessions     | session id       | [`UserSession`]| memory  |
//! | users        | forge uid        | [`User`]       | sqlite  |
//! | repo-index   | `owner/repo`     | [`RepoIndex`]  | sqlite  |
//! | manifests    | version hash     | [`Manifest`]   | sqlite  |
//! | blobs        | blob hash        | raw bytes      | sqlite  |

use std::path::Path;
use std::sync::Arc;

use crate::Error;
use crate::hash::ContentHash;
use crate::store::{MemoryStore, Raw, SharedDb, Store, Typed};
use crate::types::{ForgeUid, Manifest, Repo, RepoIndex, User, UserSession};

pub const USERS: &str = "users";
pub const REPO_INDEX: &str = "repo-index";
pub const MANIFESTS: &str = "manifests";
pub const BLOBS: &str = "blobs";
pub const SESSIONS: &str = "sessions";

/// Typed handles over every namespace. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    sessions: Typed<String, UserSession>,
    users: Typed<ForgeUid, User>,
    repo_index: Typed<Repo, RepoIndex>,
    manifests: Typed<ContentHash, Manifest>,
    blobs: Typed<ContentHash, Vec<u8>, Raw>,
}

impl Database {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let shared = SharedDb::open(path).await?;
        Self::with_shared(&shared)
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let shared = SharedDb::open_in_memory().await?;
        Self::with_shared(&shared)
    }

    fn with_shared(shared: &SharedDb) -> Result<Self, Error> {
        let persistent = |name: &str| -> Result<Arc<dyn Store>, Error> { Ok(Arc::new(shared.namespace(name)?)) };

        Ok(Self {
            sessions: Typed::new(Arc::new(MemoryStore::new(SESSIONS))),
            users: Typed::new(persistent(USERS)?),
            repo_index: Typed::new(persistent(REPO_INDEX)?),
            manifests: Typed::new(persistent(MANIFESTS)?),
            blobs: Typed::new(persistent(BLOBS)?),
        })
    }

    pub fn sessions(&self) -> &Typed<String, UserSession> {
        &self.sessions
    }

    pub fn users(&self) -> &Typed<ForgeUid, User> {
        &self.users
    }

    pub fn repo_index(&self) -> &Typed<Repo, RepoIndex> {
        &self.repo_index
    }

    pub fn manifests(&self) -> &Typed<ContentHash, Manifest> {
        &self.manifests
    }

    pub fn blobs(&self) -> &Typed<ContentHash, Vec<u8>, Raw> {
        &self.blobs
    }

    /// Close every namespace, reporting the first failure.
    ///
    /// All namespaces are closed even when an earlier one fails.
    pub async fn close(&self) -> Result<(), Error> {
        let results = [
            self.sessions.close().await,
            self.users.close().await,
            self.repo_index.close().await,
            self.manifests.close().await,
            self.blobs.close().await,
        ];
        for result in results {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to close namespace");
                return Err(e);
            }
        }
        Ok(())
    }
}
