//! # Batch Engine
//!
//! A batch accumulates messages for one topic until it is committed, then sends
//! them in a single transport call and resolves every message's future.
//!
//! ## Lifecycle
//!
//! ```text
//! Accepting --commit()--> Starting --flush--> InProgress --> Success | Error
//!     |
//!     +--cancel()--> Error
//! ```
//!
//! `commit()` flips the status to `Starting` under the batch lock before it
//! schedules the flush on the runtime, so any `publish` that takes the lock
//! afterwards sees a closed batch. The lock guards only status and contents;
//! it is never held across the transport call, while resolving futures, or
//! while running the done callback.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::completion::{completion_pair, Completion, PublishFuture};
use super::status::{BatchCancellationReason, BatchStatus};
use crate::config::BatchSettings;
use crate::error::{BatchError, BatchResult, PublishError};
use crate::messaging::{
    message_size_increase, request_overhead, PublisherTransport, PubsubMessage,
    SERVER_PUBLISH_MAX_BYTES,
};

/// Invoked once per flushed batch with whether the transport call succeeded
pub type BatchDoneCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Per-batch behaviour chosen by the coordinator
#[derive(Clone)]
pub struct BatchOptions {
    /// Commit automatically once a publish finds the batch full
    pub commit_when_full: bool,
    pub done_callback: Option<BatchDoneCallback>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            commit_when_full: true,
            done_callback: None,
        }
    }
}

impl BatchOptions {
    pub fn with_commit_when_full(mut self, commit_when_full: bool) -> Self {
        self.commit_when_full = commit_when_full;
        self
    }

    pub fn with_done_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.done_callback = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for BatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOptions")
            .field("commit_when_full", &self.commit_when_full)
            .field("done_callback", &self.done_callback.is_some())
            .finish()
    }
}

/// State shared between producers and the flush, guarded by the batch lock.
///
/// `messages` and `completions` only change while `status` is `Accepting`.
/// When the batch leaves `Accepting` the completions are moved out to whoever
/// resolves them (the flush or `cancel`); `messages` stays readable.
struct BatchState {
    status: BatchStatus,
    messages: Arc<Vec<PubsubMessage>>,
    completions: Vec<Completion>,
    size: usize,
}

/// A group of messages published in one request
pub struct Batch {
    id: Uuid,
    topic: String,
    settings: BatchSettings,
    options: BatchOptions,
    transport: Arc<dyn PublisherTransport>,
    runtime: Handle,
    base_request_size: usize,
    state: Mutex<BatchState>,
}

impl Batch {
    /// Create a batch that schedules its flush on the current tokio runtime
    pub fn new(
        transport: Arc<dyn PublisherTransport>,
        topic: impl Into<String>,
        settings: BatchSettings,
        options: BatchOptions,
    ) -> BatchResult<Arc<Self>> {
        let runtime = Handle::try_current().map_err(|_| BatchError::RuntimeUnavailable)?;
        Ok(Self::new_with_runtime(
            runtime, transport, topic, settings, options,
        ))
    }

    /// Create a batch that schedules its flush on `runtime`.
    ///
    /// Usable from threads that are not part of a runtime.
    pub fn new_with_runtime(
        runtime: Handle,
        transport: Arc<dyn PublisherTransport>,
        topic: impl Into<String>,
        settings: BatchSettings,
        options: BatchOptions,
    ) -> Arc<Self> {
        let topic = topic.into();
        let base_request_size = request_overhead(&topic);
        let id = Uuid::new_v4();

        debug!(
            batch_id = %id,
            topic = %topic,
            max_messages = settings.max_messages,
            max_bytes = settings.effective_max_bytes(),
            "Opened batch"
        );

        Arc::new(Self {
            id,
            topic,
            settings,
            options,
            transport,
            runtime,
            base_request_size,
            state: Mutex::new(BatchState {
                status: BatchStatus::Accepting,
                messages: Arc::new(Vec::new()),
                completions: Vec::new(),
                size: base_request_size,
            }),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Limits captured at creation
    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    pub fn commit_when_full(&self) -> bool {
        self.options.commit_when_full
    }

    pub fn status(&self) -> BatchStatus {
        self.state.lock().status
    }

    /// Encoded size of the request this batch would send, including overhead
    pub fn size(&self) -> usize {
        self.state.lock().size
    }

    pub fn message_count(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Snapshot of the messages currently held, in insertion order
    pub fn messages(&self) -> Arc<Vec<PubsubMessage>> {
        Arc::clone(&self.state.lock().messages)
    }

    /// Add a message to the batch.
    ///
    /// Returns the message's future when it was accepted, or `Ok(None)` when the
    /// batch no longer accepts messages or the message does not fit; the caller
    /// should publish it to a new batch. A message that could never be sent,
    /// even alone, fails with [`BatchError::MessageTooLarge`].
    pub fn publish(
        self: &Arc<Self>,
        message: impl Into<PubsubMessage>,
    ) -> BatchResult<Option<PublishFuture>> {
        let message = message.into();
        let size_increase = message_size_increase(&message);

        let mut future = None;
        let overflow = {
            let mut state = self.state.lock();

            if state.status == BatchStatus::Error {
                error!(
                    batch_id = %self.id,
                    topic = %self.topic,
                    "Publish called after the batch failed or was cancelled"
                );
                return Err(BatchError::PublishAfterError { batch_id: self.id });
            }

            if state.status != BatchStatus::Accepting {
                return Ok(None);
            }

            let request_size = self.base_request_size + size_increase;
            if request_size > SERVER_PUBLISH_MAX_BYTES {
                return Err(BatchError::MessageTooLarge {
                    size_bytes: request_size,
                    limit_bytes: SERVER_PUBLISH_MAX_BYTES,
                });
            }

            let new_size = state.size + size_increase;
            let new_count = state.messages.len() + 1;
            let max_messages = self.settings.max_messages;

            let fits = new_size <= self.settings.effective_max_bytes() && new_count <= max_messages;
            let overflow = !fits || new_count >= max_messages;

            // A lone message may exceed the soft limits; the server ceiling was checked above
            if state.messages.is_empty() || fits {
                let (completion, handle) = completion_pair();
                Arc::make_mut(&mut state.messages).push(message);
                state.completions.push(completion);
                state.size = new_size;
                future = Some(handle);
            }

            debug_assert_eq!(state.messages.len(), state.completions.len());
            overflow
        };

        // commit() takes the lock itself
        if overflow && self.options.commit_when_full {
            self.commit();
        }

        Ok(future)
    }

    /// Stop accepting messages and schedule the flush.
    ///
    /// Does not block. A no-op unless the batch is still accepting.
    pub fn commit(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.status != BatchStatus::Accepting {
                return;
            }
            state.status = BatchStatus::Starting;
        }

        debug!(batch_id = %self.id, topic = %self.topic, "Batch commit scheduled");

        let batch = Arc::clone(self);
        self.runtime.spawn(async move {
            batch.flush().await;
        });
    }

    /// Fail every pending message with `reason` and close the batch.
    ///
    /// Only valid while the batch is still accepting; once a commit has started
    /// the messages are resolved by the flush alone.
    pub fn cancel(&self, reason: impl Into<BatchCancellationReason>) -> BatchResult<()> {
        let reason = reason.into();

        let completions = {
            let mut state = self.state.lock();
            if state.status != BatchStatus::Accepting {
                error!(
                    batch_id = %self.id,
                    topic = %self.topic,
                    status = %state.status,
                    "Cancel called after sending started"
                );
                return Err(BatchError::CancelAfterStart {
                    batch_id: self.id,
                    status: state.status,
                });
            }
            state.status = BatchStatus::Error;
            std::mem::take(&mut state.completions)
        };

        warn!(
            batch_id = %self.id,
            topic = %self.topic,
            message_count = completions.len(),
            reason = %reason,
            "Batch cancelled"
        );

        for completion in completions {
            completion.resolve_failure(PublishError::Cancelled {
                reason: reason.clone(),
            });
        }
        Ok(())
    }

    /// The flush unit of work: send the batch and resolve every future
    async fn flush(&self) {
        let (messages, completions) = {
            let mut state = self.state.lock();
            if !state.status.can_commit() {
                debug!(
                    batch_id = %self.id,
                    status = %state.status,
                    "Batch is already in progress or has been cancelled, exiting commit"
                );
                return;
            }
            state.status = BatchStatus::InProgress;
            (
                Arc::clone(&state.messages),
                std::mem::take(&mut state.completions),
            )
        };

        if messages.is_empty() {
            debug!(batch_id = %self.id, "No messages to publish, exiting commit");
            self.set_status(BatchStatus::Success);
            return;
        }

        let start = Instant::now();
        let outcome = self.transport.publish(&self.topic, &messages).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let transport_succeeded = match outcome {
            Err(err) => {
                self.set_status(BatchStatus::Error);
                error!(
                    batch_id = %self.id,
                    topic = %self.topic,
                    kind = "transport_failure",
                    code = %err.code,
                    error = %err,
                    message_count = completions.len(),
                    duration_ms = duration_ms,
                    "Failed to publish messages"
                );
                for completion in completions {
                    completion.resolve_failure(PublishError::Transport(err.clone()));
                }
                false
            }
            Ok(response) if response.message_ids.len() == completions.len() => {
                self.set_status(BatchStatus::Success);
                info!(
                    batch_id = %self.id,
                    topic = %self.topic,
                    message_count = completions.len(),
                    duration_ms = duration_ms,
                    "Batch published"
                );
                // ids pair with messages by position
                for (completion, message_id) in completions.into_iter().zip(response.message_ids) {
                    completion.resolve_success(message_id);
                }
                true
            }
            Ok(response) => {
                self.set_status(BatchStatus::Error);
                let err = PublishError::IntegrityViolation {
                    expected: completions.len(),
                    received: response.message_ids.len(),
                };
                error!(
                    batch_id = %self.id,
                    topic = %self.topic,
                    kind = "integrity_violation",
                    duration_ms = duration_ms,
                    "Only {} of {} messages were published",
                    response.message_ids.len(),
                    completions.len()
                );
                for completion in completions {
                    completion.resolve_failure(err.clone());
                }
                false
            }
        };

        if let Some(callback) = &self.options.done_callback {
            callback(transport_succeeded);
        }
    }

    fn set_status(&self, status: BatchStatus) {
        self.state.lock().status = status;
    }
}

impl fmt::Debug for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Batch")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("status", &state.status)
            .field("message_count", &state.messages.len())
            .field("size", &state.size)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{PublishResponse, TransportError};
    use crate::test_helpers::MockTransport;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const TOPIC: &str = "projects/demo/topics/orders";

    fn settings(max_messages: usize, max_bytes: usize) -> BatchSettings {
        BatchSettings::new(max_bytes, Duration::from_millis(10), max_messages)
    }

    fn open_batch(
        transport: &Arc<MockTransport>,
        settings: BatchSettings,
        options: BatchOptions,
    ) -> Arc<Batch> {
        Batch::new(transport.clone(), TOPIC, settings, options).expect("runtime available")
    }

    #[tokio::test]
    async fn test_new_batch_starts_accepting_with_overhead() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());

        assert_eq!(batch.status(), BatchStatus::Accepting);
        assert_eq!(batch.message_count(), 0);
        assert_eq!(batch.size(), request_overhead(TOPIC));
        assert_eq!(batch.topic(), TOPIC);
        assert!(batch.commit_when_full());
    }

    #[test]
    fn test_new_outside_runtime_is_an_error() {
        let transport = Arc::new(MockTransport::new());
        let result = Batch::new(
            transport,
            TOPIC,
            BatchSettings::default(),
            BatchOptions::default(),
        );
        assert!(matches!(result, Err(BatchError::RuntimeUnavailable)));
    }

    #[tokio::test]
    async fn test_publish_tracks_size_and_order() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());

        let first = PubsubMessage::new("first");
        let second = PubsubMessage::new("second").with_attribute("k", "v");
        let expected_size =
            request_overhead(TOPIC) + message_size_increase(&first) + message_size_increase(&second);

        assert!(batch.publish(first.clone()).unwrap().is_some());
        assert!(batch.publish(second.clone()).unwrap().is_some());

        assert_eq!(batch.size(), expected_size);
        assert_eq!(*batch.messages(), vec![first, second]);
    }

    #[tokio::test]
    async fn test_byte_overflow_rejects_and_commits() {
        let transport = Arc::new(MockTransport::new());
        let payload = vec![b'x'; 100];
        let one = message_size_increase(&PubsubMessage::new(payload.clone()));
        // room for exactly two messages
        let limit = request_overhead(TOPIC) + 2 * one;
        let batch = open_batch(&transport, settings(100, limit), BatchOptions::default());

        assert!(batch.publish(payload.clone()).unwrap().is_some());
        assert!(batch.publish(payload.clone()).unwrap().is_some());
        assert_eq!(batch.status(), BatchStatus::Accepting);

        assert!(batch.publish(payload.clone()).unwrap().is_none());
        assert_ne!(batch.status(), BatchStatus::Accepting);
        assert_eq!(batch.message_count(), 2);
        assert!(batch.size() <= limit);
    }

    #[tokio::test]
    async fn test_overflow_without_auto_commit_keeps_accepting() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(
            &transport,
            settings(2, 1_000_000),
            BatchOptions::default().with_commit_when_full(false),
        );

        assert!(batch.publish("a").unwrap().is_some());
        assert!(batch.publish("b").unwrap().is_some());
        assert!(batch.publish("c").unwrap().is_none());
        assert_eq!(batch.status(), BatchStatus::Accepting);
        assert_eq!(batch.message_count(), 2);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_lone_message_over_soft_limit_is_accepted() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(100, 50), BatchOptions::default());

        let future = batch.publish(vec![b'z'; 500]).unwrap();
        assert!(future.is_some());
        assert_eq!(batch.message_count(), 1);
        // the overflow also closes the batch
        assert_ne!(batch.status(), BatchStatus::Accepting);
        assert!(future.unwrap().await.is_ok());
    }

    #[tokio::test]
    async fn test_message_over_server_ceiling_is_rejected() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(100, usize::MAX), BatchOptions::default());
        let huge = vec![0u8; SERVER_PUBLISH_MAX_BYTES];

        let err = batch.publish(huge.clone()).unwrap_err();
        assert!(matches!(err, BatchError::MessageTooLarge { limit_bytes, .. } if limit_bytes == SERVER_PUBLISH_MAX_BYTES));

        assert!(batch.publish("small").unwrap().is_some());
        assert!(matches!(
            batch.publish(huge),
            Err(BatchError::MessageTooLarge { .. })
        ));
        assert_eq!(batch.message_count(), 1);
        assert_eq!(batch.status(), BatchStatus::Accepting);
    }

    #[tokio::test]
    async fn test_commit_is_idempotent() {
        let transport = Arc::new(MockTransport::new());
        let done_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&done_calls);
        let batch = open_batch(
            &transport,
            settings(10, 1_000_000),
            BatchOptions::default().with_done_callback(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        let future = batch.publish("only").unwrap().unwrap();
        batch.commit();
        batch.commit();
        assert_eq!(future.await, Ok("msg-1".to_string()));

        tokio::task::yield_now().await;
        assert_eq!(transport.call_count(), 1);
        assert_eq!(done_calls.load(Ordering::SeqCst), 1);
        assert_eq!(batch.status(), BatchStatus::Success);
    }

    #[tokio::test]
    async fn test_empty_commit_succeeds_without_sending() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());

        batch.commit();
        batch.flush().await;
        tokio::task::yield_now().await;

        assert_eq!(batch.status(), BatchStatus::Success);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_after_cancel_is_a_noop() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());
        let future = batch.publish("doomed").unwrap().unwrap();

        batch.cancel("shutdown").unwrap();
        batch.flush().await;

        assert_eq!(batch.status(), BatchStatus::Error);
        assert_eq!(transport.call_count(), 0);
        assert!(matches!(future.await, Err(PublishError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_cancel_after_commit_is_a_usage_error() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());
        let future = batch.publish("kept").unwrap().unwrap();
        batch.commit();

        let err = batch.cancel(BatchCancellationReason::ClientStopped).unwrap_err();
        assert!(err.is_usage_error());
        assert_eq!(future.await, Ok("msg-1".to_string()));
    }

    #[tokio::test]
    async fn test_transport_failure_fails_every_future() {
        let transport = Arc::new(MockTransport::new());
        transport.push_failure(TransportError::new(
            crate::messaging::StatusCode::PermissionDenied,
            "no access",
        ));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&outcomes);
        let batch = open_batch(
            &transport,
            settings(10, 1_000_000),
            BatchOptions::default().with_done_callback(move |ok| recorded.lock().push(ok)),
        );

        let a = batch.publish("a").unwrap().unwrap();
        let b = batch.publish("b").unwrap().unwrap();
        batch.commit();

        for future in [a, b] {
            match future.await {
                Err(PublishError::Transport(err)) => assert_eq!(err.message, "no access"),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        tokio::task::yield_now().await;
        assert_eq!(batch.status(), BatchStatus::Error);
        assert_eq!(*outcomes.lock(), vec![false]);
    }

    #[tokio::test]
    async fn test_mismatched_id_count_is_integrity_violation() {
        let transport = Arc::new(MockTransport::new());
        transport.push_response(PublishResponse::new(vec!["only-one".to_string()]));
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());

        let a = batch.publish("a").unwrap().unwrap();
        let b = batch.publish("b").unwrap().unwrap();
        batch.commit();

        let expected = PublishError::IntegrityViolation {
            expected: 2,
            received: 1,
        };
        assert_eq!(a.await, Err(expected.clone()));
        assert_eq!(b.await, Err(expected));
        assert_eq!(batch.status(), BatchStatus::Error);
    }

    #[tokio::test]
    async fn test_dropping_unflushed_batch_abandons_futures() {
        let transport = Arc::new(MockTransport::new());
        let batch = open_batch(&transport, settings(10, 1_000_000), BatchOptions::default());
        let future = batch.publish("lost").unwrap().unwrap();

        drop(batch);
        assert_eq!(future.await, Err(PublishError::Abandoned));
    }
}
