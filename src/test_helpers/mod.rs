//! # Test Helpers
//!
//! A scriptable in-memory transport for exercising batches and publishers
//! without a network. Responses are served from a queue; when the queue is
//! empty every message gets a sequential id (`msg-1`, `msg-2`, ...).
//!
//! Available to other crates with the `test-utils` feature.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

use crate::messaging::{PublishResponse, PublisherTransport, PubsubMessage, TransportError};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPublish {
    pub topic: String,
    pub messages: Vec<PubsubMessage>,
}

/// In-memory transport with scripted outcomes
#[derive(Debug, Default)]
pub struct MockTransport {
    scripted: Mutex<VecDeque<Result<PublishResponse, TransportError>>>,
    calls: Mutex<Vec<RecordedPublish>>,
    next_id: AtomicUsize,
    latency: Option<Duration>,
    gate: Option<Semaphore>,
    call_started: Notify,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call until [`MockTransport::release`] lets it through
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    /// Sleep for `latency` inside every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Queue an explicit response for the next call
    pub fn push_response(&self, response: PublishResponse) {
        self.scripted.lock().push_back(Ok(response));
    }

    /// Queue a failure for the next call
    pub fn push_failure(&self, error: TransportError) {
        self.scripted.lock().push_back(Err(error));
    }

    /// Let `calls` gated calls proceed
    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RecordedPublish> {
        self.calls.lock().clone()
    }

    /// Total number of messages received across all calls
    pub fn published_message_count(&self) -> usize {
        self.calls.lock().iter().map(|call| call.messages.len()).sum()
    }

    /// Wait until at least `count` calls have started
    pub async fn wait_for_calls(&self, count: usize) {
        loop {
            let notified = self.call_started.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.call_count() >= count {
                return;
            }
            notified.await;
        }
    }

    fn generated_response(&self, count: usize) -> PublishResponse {
        let message_ids = (0..count)
            .map(|_| format!("msg-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1))
            .collect();
        PublishResponse::new(message_ids)
    }
}

#[async_trait]
impl PublisherTransport for MockTransport {
    async fn publish(
        &self,
        topic: &str,
        messages: &[PubsubMessage],
    ) -> Result<PublishResponse, TransportError> {
        self.calls.lock().push(RecordedPublish {
            topic: topic.to_string(),
            messages: messages.to_vec(),
        });
        self.call_started.notify_waiters();

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let scripted = self.scripted.lock().pop_front();
        scripted.unwrap_or_else(|| Ok(self.generated_response(messages.len())))
    }
}
