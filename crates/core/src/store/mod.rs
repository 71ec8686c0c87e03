//! Key-value storage contract.
//!
//! The [`Store`] trait is the only thing the pipeline knows about storage:
//! opaque byte values under string keys, in one logical namespace. Callers
//! marshal their own values through [`Typed`], which pairs a store with a
//! key type and a [`Codec`] (JSON for records, raw for blobs).
//!
//! Two backends are provided:
//!
//! - [`sqlite::SqliteStore`]: persistent namespaces sharing one connection
//! - [`memory::MemoryStore`]: process-local, used for sessions and tests

pub mod memory;
pub mod migrations;
pub mod sqlite;

use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Error;

pub use memory::MemoryStore;
pub use sqlite::{SharedDb, SqliteStore};

/// Byte-oriented key-value namespace.
///
/// Implementations must make each individual call atomic per key.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), Error>;

    /// Look up `key`. A missing key is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), Error>;

    /// Release the namespace. Further calls fail with [`Error::StoreClosed`].
    async fn close(&self) -> Result<(), Error>;
}

/// Value marshalling for a [`Typed`] store.
pub trait Codec<V>: Send + Sync + 'static {
    fn encode(value: &V) -> Result<Vec<u8>, Error>;
    fn decode(bytes: Vec<u8>) -> Result<V, Error>;
}

/// JSON codec for structured records.
pub struct Json;

impl<V: Serialize + DeserializeOwned> Codec<V> for Json {
    fn encode(value: &V) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode(bytes: Vec<u8>) -> Result<V, Error> {
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pass-through codec for blobs.
pub struct Raw;

impl Codec<Vec<u8>> for Raw {
    fn encode(value: &Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(value.clone())
    }

    fn decode(bytes: Vec<u8>) -> Result<Vec<u8>, Error> {
        Ok(bytes)
    }
}

/// A [`Store`] with typed keys and values.
///
/// Keys are stringified with `Display`.
pub struct Typed<K, V, C = Json> {
    store: Arc<dyn Store>,
    _marker: PhantomData<fn() -> (K, V, C)>,
}

impl<K, V, C> Clone for Typed<K, V, C> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), _marker: PhantomData }
    }
}

impl<K, V, C> Typed<K, V, C>
where
    K: Display,
    C: Codec<V>,
{
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, _marker: PhantomData }
    }

    pub async fn set(&self, key: &K, value: &V) -> Result<(), Error> {
        let bytes = C::encode(value)?;
        self.store.set(&key.to_string(), &bytes).await
    }

    pub async fn get(&self, key: &K) -> Result<Option<V>, Error> {
        match self.store.get(&key.to_string()).await? {
            Some(bytes) => C::decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    pub async fn contains(&self, key: &K) -> Result<bool, Error> {
        Ok(self.store.get(&key.to_string()).await?.is_some())
    }

    pub async fn delete(&self, key: &K) -> Result<(), Error> {
        self.store.delete(&key.to_string()).await
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.store.close().await
    }
}
