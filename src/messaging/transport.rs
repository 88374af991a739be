//! # Publisher Transport
//!
//! The network seam of the publisher. A transport sends one publish request and
//! returns the broker-assigned ids in request order, or a terminal error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::message::{PubsubMessage, PublishResponse};

/// Status codes a transport can surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    Aborted,
    Cancelled,
    DeadlineExceeded,
    FailedPrecondition,
    Internal,
    InvalidArgument,
    NotFound,
    PermissionDenied,
    ResourceExhausted,
    Unauthenticated,
    Unavailable,
    Unknown,
}

impl StatusCode {
    /// Whether a publish failing with this code may succeed on a later attempt
    pub fn is_retryable_for_publish(&self) -> bool {
        matches!(
            self,
            Self::Aborted
                | Self::Cancelled
                | Self::DeadlineExceeded
                | Self::Internal
                | Self::ResourceExhausted
                | Self::Unavailable
                | Self::Unknown
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aborted => "aborted",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::FailedPrecondition => "failed_precondition",
            Self::Internal => "internal",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::PermissionDenied => "permission_denied",
            Self::ResourceExhausted => "resource_exhausted",
            Self::Unauthenticated => "unauthenticated",
            Self::Unavailable => "unavailable",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Error returned by a transport once it has given up on a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct TransportError {
    pub code: StatusCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::Unavailable, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(StatusCode::DeadlineExceeded, message)
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable_for_publish()
    }
}

/// Batched send operation used by the batch engine.
///
/// Implementations must return ids in the same order as `messages`.
#[async_trait]
pub trait PublisherTransport: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        messages: &[PubsubMessage],
    ) -> Result<PublishResponse, TransportError>;
}

#[async_trait]
impl<T> PublisherTransport for Arc<T>
where
    T: PublisherTransport + ?Sized,
{
    async fn publish(
        &self,
        topic: &str,
        messages: &[PubsubMessage],
    ) -> Result<PublishResponse, TransportError> {
        (**self).publish(topic, messages).await
    }
}
