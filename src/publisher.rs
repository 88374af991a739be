//! # Publisher
//!
//! Minimal batch coordinator. Keeps one open batch per topic, opens a new one
//! whenever the current batch stops accepting, and commits every batch once
//! its latency window has elapsed.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::batch::{Batch, BatchOptions, PublishFuture};
use crate::config::{BatchSettings, PublisherConfig};
use crate::error::{BatchError, BatchResult};
use crate::messaging::{PublisherTransport, PubsubMessage, RetryingTransport};

#[derive(Debug, Default)]
struct PublisherCounters {
    batches_opened: AtomicU64,
    batches_succeeded: AtomicU64,
    batches_failed: AtomicU64,
}

impl PublisherCounters {
    fn record_outcome(&self, transport_succeeded: bool) {
        if transport_succeeded {
            self.batches_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.batches_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Point-in-time batch counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    pub batches_opened: u64,
    pub batches_succeeded: u64,
    pub batches_failed: u64,
}

/// Routes messages into per-topic batches
pub struct Publisher {
    transport: Arc<dyn PublisherTransport>,
    settings: BatchSettings,
    runtime: Handle,
    batches: DashMap<String, Arc<Batch>>,
    stopped: AtomicBool,
    counters: Arc<PublisherCounters>,
}

impl Publisher {
    /// Create a publisher on the current tokio runtime
    pub fn new(transport: Arc<dyn PublisherTransport>, settings: BatchSettings) -> BatchResult<Self> {
        let runtime = Handle::try_current().map_err(|_| BatchError::RuntimeUnavailable)?;
        Ok(Self::new_with_runtime(runtime, transport, settings))
    }

    pub fn new_with_runtime(
        runtime: Handle,
        transport: Arc<dyn PublisherTransport>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            transport,
            settings,
            runtime,
            batches: DashMap::new(),
            stopped: AtomicBool::new(false),
            counters: Arc::new(PublisherCounters::default()),
        }
    }

    /// Create a publisher whose transport applies the configured retry policy
    pub fn from_config<T>(transport: T, config: &PublisherConfig) -> BatchResult<Self>
    where
        T: PublisherTransport + 'static,
    {
        let transport = RetryingTransport::new(transport, config.retry.clone());
        Self::new(Arc::new(transport), config.batch.clone())
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Publish a message to `topic`.
    ///
    /// Fails synchronously only for oversized messages or after [`Publisher::stop`];
    /// everything else is reported through the returned future.
    pub fn publish(
        &self,
        topic: &str,
        message: impl Into<PubsubMessage>,
    ) -> BatchResult<PublishFuture> {
        let message = message.into();

        loop {
            if self.is_stopped() {
                return Err(BatchError::PublisherStopped);
            }

            let batch = self.current_batch(topic);
            // A finished batch (including a failed flush) is only ever replaced
            if batch.status().is_terminal() {
                self.replace_batch(topic, &batch);
                continue;
            }

            match batch.publish(message.clone()) {
                Ok(Some(future)) => return Ok(future),
                // the batch finished between the status check and the publish
                Ok(None) | Err(BatchError::PublishAfterError { .. }) => {
                    self.replace_batch(topic, &batch)
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// The batch currently receiving messages for `topic`, if any
    pub fn batch(&self, topic: &str) -> Option<Arc<Batch>> {
        self.batches.get(topic).map(|entry| Arc::clone(entry.value()))
    }

    /// Commit every open batch without stopping the publisher
    pub fn flush(&self) {
        for entry in self.batches.iter() {
            entry.value().commit();
        }
    }

    /// Stop accepting messages and commit every open batch
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(topics = self.batches.len(), "Stopping publisher, committing open batches");
        self.flush();
    }

    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            batches_opened: self.counters.batches_opened.load(Ordering::Relaxed),
            batches_succeeded: self.counters.batches_succeeded.load(Ordering::Relaxed),
            batches_failed: self.counters.batches_failed.load(Ordering::Relaxed),
        }
    }

    fn current_batch(&self, topic: &str) -> Arc<Batch> {
        if let Some(entry) = self.batches.get(topic) {
            return Arc::clone(entry.value());
        }
        let entry = self
            .batches
            .entry(topic.to_string())
            .or_insert_with(|| self.open_batch(topic));
        Arc::clone(entry.value())
    }

    /// Swap in a fresh batch unless another thread already replaced `stale`
    fn replace_batch(&self, topic: &str, stale: &Arc<Batch>) {
        match self.batches.entry(topic.to_string()) {
            Entry::Occupied(mut entry) => {
                if Arc::ptr_eq(entry.get(), stale) {
                    entry.insert(self.open_batch(topic));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(self.open_batch(topic));
            }
        }
    }

    fn open_batch(&self, topic: &str) -> Arc<Batch> {
        let counters = Arc::clone(&self.counters);
        let options =
            BatchOptions::default().with_done_callback(move |ok| counters.record_outcome(ok));

        let batch = Batch::new_with_runtime(
            self.runtime.clone(),
            Arc::clone(&self.transport),
            topic,
            self.settings.clone(),
            options,
        );
        self.counters.batches_opened.fetch_add(1, Ordering::Relaxed);

        let latency = self.settings.max_latency();
        let pending = Arc::clone(&batch);
        self.runtime.spawn(async move {
            tokio::time::sleep(latency).await;
            debug!(batch_id = %pending.id(), "Batch latency window elapsed");
            pending.commit();
        });

        batch
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("settings", &self.settings)
            .field("topics", &self.batches.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
