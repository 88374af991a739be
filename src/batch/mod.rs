//! # Batch Module
//!
//! The batching engine: a [`Batch`] groups messages for one topic, sends them in
//! one request, and resolves each message's [`PublishFuture`].

pub mod engine;
pub mod completion;
pub mod status;

pub use engine::{Batch, BatchDoneCallback, BatchOptions};
pub use completion::PublishFuture;
pub use status::{BatchCancellationReason, BatchStatus};
