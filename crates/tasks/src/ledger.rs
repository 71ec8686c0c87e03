//! Dedup ledger.
//!
//! One ledger per queue, mapping a dedup key to whether a job for that key
//! is running and when a job for it was last accepted. Admission is a single
//! read-modify-write under the ledger lock, so two workers can never both
//! accept the same key.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// Ledger state for one dedup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupEntry {
    pub running: bool,
    pub last_accepted: DateTime<Utc>,
}

/// Outcome of asking the ledger whether a job may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The job runs; the entry is now marked running.
    Accepted,
    /// The job was posted before the last accepted job for its key.
    Stale,
    /// Another job for the same key is executing.
    InFlight,
}

#[derive(Debug, Default)]
pub struct DedupLedger {
    entries: Mutex<HashMap<String, DedupEntry>>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether a job posted at `posted` may run now.
    ///
    /// On acceptance the entry becomes `{running: true, last_accepted: now}`.
    pub fn admit(&self, key: &str, posted: DateTime<Utc>, now: DateTime<Utc>) -> Admission {
        let mut entries = self.lock();
        if let Some(entry) = entries.get(key) {
            if posted < entry.last_accepted {
                return Admission::Stale;
            }
            if entry.running {
                return Admission::InFlight;
            }
        }
        entries.insert(key.to_string(), DedupEntry { running: true, last_accepted: now });
        Admission::Accepted
    }

    /// Record a successful run.
    pub fn complete(&self, key: &str, now: DateTime<Utc>) {
        self.lock()
            .insert(key.to_string(), DedupEntry { running: false, last_accepted: now });
    }

    /// Record a failed run. The key is forgotten so the next submission runs.
    pub fn forget(&self, key: &str) {
        self.lock().remove(key);
    }

    pub fn entry(&self, key: &str) -> Option<DedupEntry> {
        self.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Critical sections never panic, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, DedupEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
