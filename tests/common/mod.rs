//! Shared setup for integration tests
#![allow(dead_code)]

use parking_lot::Mutex;
use pubsub_publisher::test_helpers::MockTransport;
use pubsub_publisher::{Batch, BatchOptions, BatchSettings};
use std::sync::Arc;
use std::time::Duration;

pub const TOPIC: &str = "projects/integration/topics/events";

pub fn settings(max_messages: usize, max_bytes: usize) -> BatchSettings {
    BatchSettings::new(max_bytes, Duration::from_millis(10), max_messages)
}

/// Records every done-callback invocation in order
#[derive(Debug, Clone, Default)]
pub struct DoneRecorder {
    outcomes: Arc<Mutex<Vec<bool>>>,
}

impl DoneRecorder {
    pub fn options(&self) -> BatchOptions {
        let outcomes = Arc::clone(&self.outcomes);
        BatchOptions::default().with_done_callback(move |ok| outcomes.lock().push(ok))
    }

    pub fn outcomes(&self) -> Vec<bool> {
        self.outcomes.lock().clone()
    }
}

pub fn open_batch(
    transport: &Arc<MockTransport>,
    settings: BatchSettings,
    options: BatchOptions,
) -> Arc<Batch> {
    Batch::new(transport.clone(), TOPIC, settings, options).expect("tokio runtime available")
}

/// Poll `condition` until it holds; the done callback runs after handles resolve
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached within 5s"
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
