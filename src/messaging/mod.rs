//! # Messaging Module
//!
//! Wire messages and size accounting, the transport seam, and the retry
//! policy applied to publish calls.

pub mod message;
pub mod retry;
pub mod transport;

pub use message::*;
pub use retry::RetryingTransport;
pub use transport::{PublisherTransport, StatusCode, TransportError};
