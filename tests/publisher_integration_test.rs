//! Publisher wired from configuration, including the retry policy

mod common;

use common::{eventually, TOPIC};
use pubsub_publisher::test_helpers::MockTransport;
use pubsub_publisher::{
    BatchError, ConfigLoader, PublishError, Publisher, PublisherConfig, StatusCode,
    TransportError,
};
use std::io::Write;
use std::sync::Arc;

fn fast_retry_config(max_messages: usize) -> PublisherConfig {
    let mut config = PublisherConfig::default();
    config.batch.max_messages = max_messages;
    config.batch.max_latency_ms = 5;
    config.retry.initial_backoff_ms = 1;
    config.retry.max_backoff_ms = 4;
    config.retry.deadline_ms = 2_000;
    config.retry.timeout_ms = 1_000;
    config
}

#[tokio::test]
async fn test_transient_failures_are_retried_before_resolving() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failure(TransportError::unavailable("connection reset"));
    transport.push_failure(TransportError::new(StatusCode::Aborted, "conflict"));

    let publisher =
        Publisher::from_config(transport.clone(), &fast_retry_config(2)).expect("runtime");
    let a = publisher.publish(TOPIC, "A").unwrap();
    let b = publisher.publish(TOPIC, "B").unwrap();

    assert_eq!(a.await, Ok("msg-1".to_string()));
    assert_eq!(b.await, Ok("msg-2".to_string()));
    // two failed attempts plus the one that succeeded, all with the same payload
    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test]
async fn test_terminal_failure_reaches_every_handle() {
    let transport = Arc::new(MockTransport::new());
    transport.push_failure(TransportError::new(
        StatusCode::InvalidArgument,
        "bad topic",
    ));

    let publisher =
        Publisher::from_config(transport.clone(), &fast_retry_config(2)).expect("runtime");
    let a = publisher.publish(TOPIC, "A").unwrap();
    let b = publisher.publish(TOPIC, "B").unwrap();

    for handle in [a, b] {
        match handle.await {
            Err(PublishError::Transport(err)) => {
                assert_eq!(err.code, StatusCode::InvalidArgument)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert_eq!(transport.call_count(), 1);
    eventually(|| publisher.stats().batches_failed == 1).await;
}

#[tokio::test]
async fn test_publisher_from_loaded_file() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp file");
    file.write_all(b"[batch]\nmax_messages = 3\nmax_latency_ms = 60000\n")
        .expect("write config");

    let config = ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("PUBSUB_PUBLISHER_INTEGRATION")
        .load()
        .expect("config loads");
    assert_eq!(config.batch.max_messages, 3);

    let transport = Arc::new(MockTransport::new());
    let publisher = Publisher::from_config(transport.clone(), &config).expect("runtime");

    let handles: Vec<_> = (0..7)
        .map(|i| publisher.publish(TOPIC, format!("m{i}")).unwrap())
        .collect();

    // two full batches left on their own; the partial third waits for stop()
    transport.wait_for_calls(2).await;
    publisher.stop();
    for handle in handles {
        assert!(handle.await.is_ok());
    }

    let sizes: Vec<_> = transport
        .calls()
        .iter()
        .map(|call| call.messages.len())
        .collect();
    assert_eq!(sizes, vec![3, 3, 1]);
    assert!(matches!(
        publisher.publish(TOPIC, "late"),
        Err(BatchError::PublisherStopped)
    ));
}

#[test]
fn test_sample_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/publisher.toml");
    let config = ConfigLoader::new()
        .with_file(path)
        .with_env_prefix("PUBSUB_SAMPLE_CONFIG")
        .load()
        .expect("sample config loads");
    assert_eq!(config, PublisherConfig::default());
}
