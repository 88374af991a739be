//! # Publisher Error Types
//!
//! Two families of errors:
//!
//! - [`BatchError`] is returned synchronously from batch and publisher calls:
//!   oversized messages and contract violations by the caller.
//! - [`PublishError`] is delivered through a message's [`PublishFuture`] and
//!   describes why that message was not published.
//!
//! [`PublishFuture`]: crate::batch::PublishFuture

use thiserror::Error;
use uuid::Uuid;

use crate::batch::{BatchCancellationReason, BatchStatus};
use crate::messaging::TransportError;

/// Per-message failure delivered through a completion handle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    /// The publish call failed terminally after the transport's own retries
    #[error("Publish request failed: {0}")]
    Transport(#[from] TransportError),

    /// The broker returned a different number of ids than messages were sent
    #[error("Some messages were not successfully published. ({received} ids returned for {expected} messages)")]
    IntegrityViolation { expected: usize, received: usize },

    /// The batch was cancelled before it was sent
    #[error("{reason}")]
    Cancelled { reason: BatchCancellationReason },

    /// The batch was dropped before it could resolve this message
    #[error("Batch was dropped before the message was published")]
    Abandoned,
}

/// Errors returned synchronously to the caller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BatchError {
    /// The message alone would exceed the backend's request size ceiling
    #[error("The message being published would produce too large a publish request ({size_bytes} bytes) that would exceed the maximum allowed size on the backend ({limit_bytes} bytes)")]
    MessageTooLarge {
        size_bytes: usize,
        limit_bytes: usize,
    },

    /// `publish` was called on a batch that already failed or was cancelled
    #[error("Publish called on batch {batch_id} after it entered the error state")]
    PublishAfterError { batch_id: Uuid },

    /// `cancel` was called after sending had started
    #[error("Cancel called on batch {batch_id} after sending started (status: {status})")]
    CancelAfterStart { batch_id: Uuid, status: BatchStatus },

    /// The publisher has been stopped and no longer accepts messages
    #[error("Publisher has been stopped")]
    PublisherStopped,

    /// A batch was created outside a tokio runtime and none was supplied
    #[error("No tokio runtime available to schedule batch commits")]
    RuntimeUnavailable,
}

impl BatchError {
    /// Whether this error is a caller contract violation rather than a data problem
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::PublishAfterError { .. } | Self::CancelAfterStart { .. }
        )
    }
}

/// Result type for synchronous batch operations
pub type BatchResult<T> = Result<T, BatchError>;

/// Outcome delivered through a completion handle: the broker-assigned id or the failure
pub type PublishResult = Result<String, PublishError>;
