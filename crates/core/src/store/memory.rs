//! In-memory [`Store`] implementation.
//!
//! Backs the session namespace (sessions do not survive a restart) and the
//! pipeline tests. Uses `HashMap` behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::Store;
use crate::Error;

/// Process-local key-value namespace.
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), entries: RwLock::new(HashMap::new()), closed: AtomicBool::new(false) }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::StoreClosed(self.name.clone()));
        }
        Ok(())
    }

    fn poisoned(&self) -> Error {
        Error::StoreClosed(format!("{} (lock poisoned)", self.name))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error> {
        self.check_open()?;
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        self.check_open()?;
        let entries = self.entries.read().map_err(|_| self.poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        self.check_open()?;
        let mut entries = self.entries.write().map_err(|_| self.poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
