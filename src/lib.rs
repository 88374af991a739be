#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # PubSub Publisher
//!
//! Client-side message batching for publish-oriented messaging systems.
//!
//! ## Overview
//!
//! Producers hand individual messages to a [`Batch`]. The batch accumulates
//! them up to a message-count and byte-size limit, sends them to the broker in
//! a single transport call, and resolves one [`PublishFuture`] per message
//! with the broker-assigned id or the reason it failed.
//!
//! Guarantees, under any number of concurrent producers:
//!
//! - no message is added to a batch once its commit has been decided
//! - every accepted message's future resolves exactly once, on every path
//!   (success, transport failure, id-count mismatch, cancellation, or the
//!   batch being dropped before it was sent)
//!
//! ## Module Organization
//!
//! - [`batch`] - Batch state machine, commit/flush, completion handles
//! - [`messaging`] - Wire messages, size accounting, transport seam, retries
//! - [`publisher`] - Per-topic batch coordinator with latency-based commits
//! - [`config`] - Batch and retry settings, file + environment loading
//! - [`error`] - Synchronous and per-message error types
//! - [`logging`] - `tracing` subscriber setup
//! - `test_helpers` - Scriptable in-memory transport (feature `test-utils`)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pubsub_publisher::{Publisher, PublisherConfig};
//! # use pubsub_publisher::messaging::{PublisherTransport, PublishResponse, PubsubMessage, TransportError};
//! # struct GrpcTransport;
//! # #[async_trait::async_trait]
//! # impl PublisherTransport for GrpcTransport {
//! #     async fn publish(&self, _: &str, m: &[PubsubMessage]) -> Result<PublishResponse, TransportError> {
//! #         Ok(PublishResponse::new(vec![String::new(); m.len()]))
//! #     }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let publisher = Publisher::from_config(GrpcTransport, &PublisherConfig::default())?;
//!
//! let future = publisher.publish("projects/demo/topics/orders", "hello")?;
//! let message_id = future.await?;
//! println!("published as {message_id}");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod messaging;
pub mod publisher;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use batch::{
    Batch, BatchCancellationReason, BatchDoneCallback, BatchOptions, BatchStatus, PublishFuture,
};
pub use config::{BatchSettings, ConfigLoader, PublishRetrySettings, PublisherConfig};
pub use error::{BatchError, BatchResult, PublishError, PublishResult};
pub use messaging::{
    PublishResponse, PublisherTransport, PubsubMessage, RetryingTransport, StatusCode,
    TransportError, SERVER_PUBLISH_MAX_BYTES,
};
pub use publisher::{Publisher, PublisherStats};
