//! # Wire Messages
//!
//! Protobuf representations of the publish request and its messages, plus the
//! size accounting the batch engine relies on. Sizes are exact encoded lengths,
//! so a batch can predict the byte size of the request it will eventually send.

use bytes::Bytes;
use prost::Message;
use std::collections::HashMap;

/// Maximum size of a publish request accepted by the backend, in bytes.
pub const SERVER_PUBLISH_MAX_BYTES: usize = 10 * 1000 * 1000;

/// Encoded key length of `PublishRequest.messages` (field 2, length-delimited).
const MESSAGES_FIELD_KEY_LEN: usize = 1;

/// A single message as it travels on the wire.
#[derive(Clone, PartialEq, Message)]
pub struct PubsubMessage {
    /// Opaque message payload
    #[prost(bytes = "bytes", tag = "1")]
    pub data: Bytes,

    /// Optional key/value attributes
    #[prost(map = "string, string", tag = "2")]
    pub attributes: HashMap<String, String>,

    /// Broker-assigned identifier, populated by the server
    #[prost(string, tag = "3")]
    pub message_id: String,

    /// Ordering key; empty when ordering is not requested
    #[prost(string, tag = "5")]
    pub ordering_key: String,
}

impl PubsubMessage {
    /// Create a message carrying the given payload
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Attach an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the ordering key
    pub fn with_ordering_key(mut self, ordering_key: impl Into<String>) -> Self {
        self.ordering_key = ordering_key.into();
        self
    }
}

impl From<Bytes> for PubsubMessage {
    fn from(data: Bytes) -> Self {
        Self::new(data)
    }
}

impl From<Vec<u8>> for PubsubMessage {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&[u8]> for PubsubMessage {
    fn from(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }
}

impl From<String> for PubsubMessage {
    fn from(data: String) -> Self {
        Self::new(data)
    }
}

impl From<&str> for PubsubMessage {
    fn from(data: &str) -> Self {
        Self::new(Bytes::copy_from_slice(data.as_bytes()))
    }
}

/// Request sent to the backend for one batch
#[derive(Clone, PartialEq, Message)]
pub struct PublishRequest {
    #[prost(string, tag = "1")]
    pub topic: String,

    #[prost(message, repeated, tag = "2")]
    pub messages: Vec<PubsubMessage>,
}

/// Response to a publish request; ids are positional with the request messages
#[derive(Clone, PartialEq, Message)]
pub struct PublishResponse {
    #[prost(string, repeated, tag = "1")]
    pub message_ids: Vec<String>,
}

impl PublishResponse {
    pub fn new(message_ids: Vec<String>) -> Self {
        Self { message_ids }
    }
}

/// Encoded size of an empty publish request for `topic`.
///
/// This is the fixed overhead every batch starts from.
pub fn request_overhead(topic: &str) -> usize {
    PublishRequest {
        topic: topic.to_string(),
        messages: Vec::new(),
    }
    .encoded_len()
}

/// Number of bytes `message` adds to a publish request: the field key, the
/// length prefix and the encoded message itself.
pub fn message_size_increase(message: &PubsubMessage) -> usize {
    let len = message.encoded_len();
    MESSAGES_FIELD_KEY_LEN + prost::length_delimiter_len(len) + len
}
