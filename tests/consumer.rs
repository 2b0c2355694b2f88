//! Consumer pool end-to-end against the in-process broker.

use bytes::Bytes;
use loadtest_consumer::{ConsumerWorkerPool, ReportTrigger, RunningConsumerPool};
use loadtest_core::{BrokerSettings, ConsumeMode, ConsumerConfig, PoolState, ProviderUrl};
use queue_client::{BytesMessage, Connector, Destination, MemoryBroker, Message};
use std::time::{Duration, Instant};

fn consumer_config(destination: &str, mode: ConsumeMode) -> ConsumerConfig {
    ConsumerConfig {
        broker: BrokerSettings {
            provider: ProviderUrl::Memory(destination.to_string()),
            principal: None,
            credentials: None,
            client_id: "consumer-test".to_string(),
            destination: destination.to_string(),
        },
        thread_count: 2,
        stats_interval: 100,
        mode,
        receive_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(25),
        read_buffer_bytes: 512 * 1024,
        group_id: "consumer-test".to_string(),
        run_duration: None,
    }
}

fn binary(size: usize) -> Message {
    Message::Bytes(BytesMessage::new(Bytes::from(vec![0xAB; size])))
}

async fn wait_until_consumed(pool: &RunningConsumerPool, expected: u64) {
    let aggregator = pool.aggregator();
    let deadline = Instant::now() + Duration::from_secs(5);
    while aggregator.totals().total_messages() < expected {
        assert!(Instant::now() < deadline, "timed out waiting for {expected} messages");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_non_binary_message_counts_zero_bytes() {
    let broker = MemoryBroker::new();
    let destination = Destination::new("mixed");
    broker.publish(&destination, Message::Text("not a payload".to_string()));
    broker.publish(&destination, Message::Empty);
    broker.publish(&destination, binary(1_048_576));

    let connection = broker.connect().await.unwrap();
    let pool = ConsumerWorkerPool::new(consumer_config("mixed", ConsumeMode::Push), connection)
        .start()
        .unwrap();
    wait_until_consumed(&pool, 3).await;
    pool.request_stop();
    let summary = pool.wait_for_stopped().await;

    assert_eq!(summary.final_report.total_messages, 3);
    assert_eq!(summary.final_report.total_bytes, 1_048_576);
    assert_eq!(summary.final_report.total_mb, 1.0);
}

#[tokio::test]
async fn test_stats_reported_at_each_interval_and_at_shutdown() {
    let broker = MemoryBroker::new();
    let destination = Destination::new("stats");
    for _ in 0..250 {
        broker.publish(&destination, binary(16));
    }

    let connection = broker.connect().await.unwrap();
    let mut config = consumer_config("stats", ConsumeMode::Pull);
    config.thread_count = 3;
    let pool = ConsumerWorkerPool::new(config, connection).start().unwrap();
    wait_until_consumed(&pool, 250).await;
    pool.request_stop();
    let summary = pool.wait_for_stopped().await;

    // 100 and 200, then the shutdown report
    assert_eq!(summary.reports_emitted, 3);
    assert_eq!(summary.final_report.trigger, ReportTrigger::Shutdown);
    assert_eq!(summary.final_report.total_messages, 250);
    assert_eq!(summary.final_report.total_bytes, 250 * 16);
}

#[tokio::test]
async fn test_shutdown_latency_push_mode() {
    let broker = MemoryBroker::new();
    let connection = broker.connect().await.unwrap();
    let mut config = consumer_config("idle-push", ConsumeMode::Push);
    config.thread_count = 4;
    let pool = ConsumerWorkerPool::new(config, connection).start().unwrap();
    let state = pool.subscribe();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let requested = Instant::now();
    assert!(pool.request_stop());
    let summary = pool.wait_for_stopped().await;

    // Bounded by a poll interval, not instantaneous join of a still-running pool
    assert!(requested.elapsed() < Duration::from_millis(250));
    assert_eq!(summary.state, PoolState::Stopped);
    assert_eq!(*state.borrow(), PoolState::Stopped);
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_shutdown_latency_pull_mode() {
    let broker = MemoryBroker::new();
    let connection = broker.connect().await.unwrap();
    let pool = ConsumerWorkerPool::new(consumer_config("idle-pull", ConsumeMode::Pull), connection)
        .start()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    let requested = Instant::now();
    pool.request_stop();
    pool.wait_for_stopped().await;

    assert!(requested.elapsed() < Duration::from_millis(300));
    assert_eq!(broker.open_sessions(), 0);
}

#[tokio::test]
async fn test_totals_match_processed_messages() {
    let broker = MemoryBroker::new();
    let destination = Destination::new("totals");
    let sizes = [0usize, 1, 1000, 700_000, 1_048_576, 3];
    for size in sizes {
        broker.publish(&destination, binary(size));
    }

    let connection = broker.connect().await.unwrap();
    let pool = ConsumerWorkerPool::new(consumer_config("totals", ConsumeMode::Push), connection)
        .start()
        .unwrap();
    wait_until_consumed(&pool, sizes.len() as u64).await;
    pool.request_stop();
    let summary = pool.wait_for_stopped().await;

    let expected: u64 = sizes.iter().map(|s| *s as u64).sum();
    assert_eq!(summary.final_report.total_bytes, expected);
    assert_eq!(
        summary.workers.iter().map(|w| w.messages_received).sum::<u64>(),
        sizes.len() as u64
    );
}
