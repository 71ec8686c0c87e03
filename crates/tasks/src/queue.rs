//! Named work queues with per-key deduplication.
//!
//! Each queue name owns a lane: an unbounded channel of [`Envelope`]s
//! drained by a fixed pool of workers, and a [`DedupLedger`]. A worker
//! decodes the payload, asks the ledger for admission, and only then hands
//! the job to the [`Runner`]. Success marks the key idle; failure forgets it.
//!
//! Nothing is persisted. Jobs lost when the process exits are recreated by
//! the next read that needs them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pagemirror_core::Error;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

use crate::ledger::{Admission, DedupLedger};

/// A unit of queued work.
pub trait Job: Sized + Send + Sync + 'static {
    /// Lane this job is submitted to.
    fn queue_name(&self) -> &'static str;

    /// Jobs with equal keys on the same lane are deduplicated.
    fn dedup_key(&self) -> String;

    fn encode(&self) -> Result<String, Error>;

    fn decode(queue: &str, payload: &str) -> Result<Self, Error>;
}

/// Executes admitted jobs. The queue is passed in so a job can enqueue more.
#[async_trait]
pub trait Runner<J: Job>: Send + Sync + 'static {
    async fn run(&self, job: J, queue: &Queue<J>) -> Result<(), Error>;
}

/// A queued job: the encoded payload and the time it was posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub posted: DateTime<Utc>,
    pub payload: String,
}

/// What happened to one dequeued envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    /// Dropped by the ledger.
    Skipped(Admission),
    /// The payload did not decode.
    Invalid,
}

struct Lane {
    name: &'static str,
    sender: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    ledger: Arc<DedupLedger>,
}

struct QueueInner<J: Job> {
    lanes: HashMap<&'static str, Lane>,
    runner: Arc<dyn Runner<J>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    pending: AtomicUsize,
    idle: Notify,
}

/// Handle to a running set of lanes. Cheap to clone.
pub struct Queue<J: Job> {
    inner: Arc<QueueInner<J>>,
}

impl<J: Job> Clone for Queue<J> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<J: Job> Queue<J> {
    /// Create one lane per name and spawn `workers_per_queue` workers for each.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(names: &[&'static str], workers_per_queue: usize, runner: Arc<dyn Runner<J>>) -> Self {
        let mut lanes = HashMap::new();
        let mut receivers = Vec::new();
        for &name in names {
            let (sender, receiver) = mpsc::unbounded_channel();
            lanes.insert(
                name,
                Lane { name, sender: Mutex::new(Some(sender)), ledger: Arc::new(DedupLedger::new()) },
            );
            receivers.push((name, Arc::new(tokio::sync::Mutex::new(receiver))));
        }

        let queue = Self {
            inner: Arc::new(QueueInner {
                lanes,
                runner,
                workers: Mutex::new(Vec::new()),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        };

        let mut handles = Vec::new();
        for (name, receiver) in receivers {
            for worker in 0..workers_per_queue.max(1) {
                let queue = queue.clone();
                let receiver = receiver.clone();
                handles.push(tokio::spawn(async move {
                    tracing::debug!(queue = name, worker, "worker started");
                    loop {
                        let envelope = receiver.lock().await.recv().await;
                        let Some(envelope) = envelope else { break };
                        queue.process(name, envelope).await;
                    }
                    tracing::debug!(queue = name, worker, "worker stopped");
                }));
            }
        }
        *queue.workers() = handles;

        tracing::info!(queues = names.len(), workers_per_queue, "queue started");
        queue
    }

    /// Submit a job posted now.
    pub fn submit(&self, job: &J) -> Result<(), Error> {
        self.submit_posted(job, Utc::now())
    }

    /// Submit a job with an explicit post time.
    pub fn submit_posted(&self, job: &J, posted: DateTime<Utc>) -> Result<(), Error> {
        let name = job.queue_name();
        let lane = self.lane(name)?;
        let envelope = Envelope { posted, payload: job.encode()? };

        let sender = lane.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = sender.as_ref().ok_or(Error::QueueClosed)?;

        self.inner.pending.fetch_add(1, Ordering::AcqRel);
        if sender.send(envelope).is_err() {
            self.finish_one();
            return Err(Error::QueueClosed);
        }
        tracing::debug!(queue = name, key = %job.dedup_key(), "job submitted");
        Ok(())
    }

    /// Ledger of a lane, for inspection.
    pub fn ledger(&self, name: &str) -> Option<Arc<DedupLedger>> {
        self.inner.lanes.get(name).map(|lane| lane.ledger.clone())
    }

    /// Jobs submitted but not yet finished, including those they submit.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::Acquire)
    }

    /// Wait until every submitted job, and every job those submit, is done.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs, let workers drain what is queued, and join them.
    pub async fn shutdown(&self) {
        for lane in self.inner.lanes.values() {
            lane.sender.lock().unwrap_or_else(PoisonError::into_inner).take();
        }

        let handles = std::mem::take(&mut *self.workers());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker exited abnormally");
            }
        }
        tracing::info!("queue stopped");
    }

    async fn process(&self, name: &'static str, envelope: Envelope) -> Outcome {
        let outcome = match self.lane(name) {
            Ok(lane) => self.execute(lane, envelope).await,
            Err(_) => Outcome::Invalid,
        };
        self.finish_one();
        outcome
    }

    async fn execute(&self, lane: &Lane, envelope: Envelope) -> Outcome {
        let job = match J::decode(lane.name, &envelope.payload) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(queue = lane.name, error = %e, payload = %envelope.payload, "dropping undecodable job");
                return Outcome::Invalid;
            }
        };

        let key = job.dedup_key();
        match lane.ledger.admit(&key, envelope.posted, Utc::now()) {
            Admission::Accepted => {}
            skipped => {
                tracing::debug!(queue = lane.name, %key, ?skipped, "skipping duplicate job");
                return Outcome::Skipped(skipped);
            }
        }

        tracing::info!(queue = lane.name, %key, "job started");
        let runner = self.inner.runner.clone();
        let queue = self.clone();
        // Run on its own task so a panic fails the job instead of the worker.
        let result = tokio::spawn(async move { runner.run(job, &queue).await }).await;

        match result {
            Ok(Ok(())) => {
                lane.ledger.complete(&key, Utc::now());
                tracing::info!(queue = lane.name, %key, "job completed");
                Outcome::Completed
            }
            Ok(Err(e)) => {
                lane.ledger.forget(&key);
                tracing::error!(queue = lane.name, %key, error = %e, "job failed");
                Outcome::Failed
            }
            Err(e) => {
                lane.ledger.forget(&key);
                tracing::error!(queue = lane.name, %key, error = %e, "job panicked");
                Outcome::Failed
            }
        }
    }

    fn lane(&self, name: &str) -> Result<&Lane, Error> {
        self.inner.lanes.get(name).ok_or_else(|| Error::UnknownQueue(name.to_string()))
    }

    fn finish_one(&self) {
        if self.inner.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }

    fn workers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
