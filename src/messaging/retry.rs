//! # Retrying Transport
//!
//! Wraps a transport with the publish retry policy: exponential backoff on
//! retryable status codes, bounded per attempt by a timeout and overall by a
//! deadline. Errors that come out of this wrapper are terminal.

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::message::{PubsubMessage, PublishResponse};
use super::transport::{PublisherTransport, TransportError};
use crate::config::PublishRetrySettings;

/// Transport decorator applying [`PublishRetrySettings`]
#[derive(Debug, Clone)]
pub struct RetryingTransport<T> {
    inner: T,
    settings: PublishRetrySettings,
}

impl<T> RetryingTransport<T> {
    pub fn new(inner: T, settings: PublishRetrySettings) -> Self {
        Self { inner, settings }
    }

    pub fn settings(&self) -> &PublishRetrySettings {
        &self.settings
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T> PublisherTransport for RetryingTransport<T>
where
    T: PublisherTransport,
{
    async fn publish(
        &self,
        topic: &str,
        messages: &[PubsubMessage],
    ) -> Result<PublishResponse, TransportError> {
        let started = Instant::now();
        let deadline = self.settings.deadline();
        let mut backoff = self.settings.initial_backoff();
        let mut attempt: u32 = 1;

        loop {
            let outcome =
                match tokio::time::timeout(self.settings.timeout(), self.inner.publish(topic, messages))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(TransportError::deadline_exceeded(format!(
                        "publish attempt timed out after {}ms",
                        self.settings.timeout_ms
                    ))),
                };

            let err = match outcome {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(topic = %topic, attempt = attempt, "Publish succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if started.elapsed() + backoff > deadline {
                warn!(
                    topic = %topic,
                    attempt = attempt,
                    code = %err.code,
                    deadline_ms = self.settings.deadline_ms,
                    "Publish retry deadline exhausted"
                );
                return Err(err);
            }

            warn!(
                topic = %topic,
                attempt = attempt,
                code = %err.code,
                backoff_ms = backoff.as_millis() as u64,
                "Retrying publish after transient error"
            );

            tokio::time::sleep(backoff).await;
            backoff = self.settings.next_backoff(backoff);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::StatusCode;
    use crate::test_helpers::MockTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_settings() -> PublishRetrySettings {
        PublishRetrySettings {
            initial_backoff_ms: 10,
            max_backoff_ms: 100,
            backoff_multiplier: 2.0,
            deadline_ms: 1_000,
            timeout_ms: 500,
        }
    }

    fn messages() -> Vec<PubsubMessage> {
        vec![PubsubMessage::new("a"), PubsubMessage::new("b")]
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_errors_until_success() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure(TransportError::unavailable("blip"));
        mock.push_failure(TransportError::new(StatusCode::Aborted, "contention"));
        let transport = RetryingTransport::new(Arc::clone(&mock), fast_settings());

        let response = transport.publish("topic", &messages()).await.unwrap();
        assert_eq!(response.message_ids.len(), 2);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let mock = Arc::new(MockTransport::new());
        mock.push_failure(TransportError::new(StatusCode::InvalidArgument, "bad topic"));
        let transport = RetryingTransport::new(Arc::clone(&mock), fast_settings());

        let err = transport.publish("topic", &messages()).await.unwrap_err();
        assert_eq!(err.code, StatusCode::InvalidArgument);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_deadline() {
        let mock = Arc::new(MockTransport::new());
        for _ in 0..100 {
            mock.push_failure(TransportError::unavailable("down"));
        }
        let transport = RetryingTransport::new(Arc::clone(&mock), fast_settings());

        let started = tokio::time::Instant::now();
        let err = transport.publish("topic", &messages()).await.unwrap_err();
        assert_eq!(err.code, StatusCode::Unavailable);
        assert!(started.elapsed() <= Duration::from_millis(1_000));
        assert!(mock.call_count() > 1 && mock.call_count() < 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempt_times_out_as_deadline_exceeded() {
        let mock = Arc::new(MockTransport::new().with_latency(Duration::from_secs(10)));
        let settings = PublishRetrySettings {
            deadline_ms: 0,
            ..fast_settings()
        };
        let transport = RetryingTransport::new(Arc::clone(&mock), settings);

        let err = transport.publish("topic", &messages()).await.unwrap_err();
        assert_eq!(err.code, StatusCode::DeadlineExceeded);
    }
}
