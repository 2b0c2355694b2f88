//! Sender and consumer in one process, wired the way the CLI wires them.

use loadtest_core::{BrokerArgs, ConsumeMode, PoolState, BYTES_PER_MB};
use loadtest_consumer::ConsumerArgs;
use loadtest_sender::SenderArgs;
use queue_client::MemoryBroker;
use queue_loadtest::{connect, run_loopback, write_metrics, StopTriggers};
use std::time::Duration;

fn broker_args(name: &str) -> BrokerArgs {
    BrokerArgs {
        provider_url: Some(format!("memory://{name}")),
        destination: Some(name.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_loopback_consumes_everything_sent() -> Result<(), Box<dyn std::error::Error>> {
    let broker = broker_args("loopback-all");
    let sender = SenderArgs {
        message_count: Some(10),
        min_size_mb: Some(0),
        max_size_mb: Some(1),
        pause_ms: Some(0),
        sender_threads: Some(3),
        seed: Some(42),
    };
    let consumer = ConsumerArgs {
        consumer_threads: Some(2),
        stats_interval: Some(5),
        mode: Some(ConsumeMode::Pull),
        receive_timeout_ms: Some(200),
        ..Default::default()
    };

    let sender_config = sender.resolve(&broker)?;
    let consumer_config = consumer.resolve(&broker)?;
    let connection = connect(&consumer_config.broker, None).await?;

    let summary = run_loopback(
        sender_config,
        consumer_config,
        connection,
        StopTriggers::default(),
    )
    .await?;

    assert_eq!(summary.send.state, PoolState::Completed);
    assert_eq!(summary.send.messages_sent, 10);
    assert_eq!(summary.consume.state, PoolState::Stopped);
    assert_eq!(summary.consume.final_report.total_messages, 10);
    assert_eq!(summary.consume.final_report.total_bytes, summary.send.bytes_sent);
    assert_eq!(summary.send.bytes_sent % BYTES_PER_MB, 0);
    // 5 and 10, then shutdown
    assert_eq!(summary.consume.reports_emitted, 3);
    Ok(())
}

#[tokio::test]
async fn test_loopback_deadline_stops_both_pools() -> Result<(), Box<dyn std::error::Error>> {
    let broker = broker_args("loopback-deadline");
    let sender = SenderArgs {
        message_count: Some(1000),
        min_size_mb: Some(0),
        max_size_mb: Some(0),
        pause_ms: Some(50),
        ..Default::default()
    };
    let consumer = ConsumerArgs {
        poll_interval_ms: Some(20),
        ..Default::default()
    };

    let sender_config = sender.resolve(&broker)?;
    let consumer_config = consumer.resolve(&broker)?;
    let connection = connect(&consumer_config.broker, None).await?;

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        run_loopback(
            sender_config,
            consumer_config,
            connection,
            StopTriggers {
                deadline: Some(Duration::from_millis(200)),
                ..Default::default()
            },
        ),
    )
    .await??;

    assert_eq!(summary.send.state, PoolState::Stopped);
    assert!(summary.send.messages_sent < 1000);
    assert_eq!(summary.consume.state, PoolState::Stopped);
    Ok(())
}

#[tokio::test]
async fn test_loopback_returns_when_no_consumer_starts() -> Result<(), Box<dyn std::error::Error>> {
    let broker = broker_args("loopback-dead-consumers");
    MemoryBroker::named("loopback-dead-consumers").set_fail_consumers(true);
    let sender = SenderArgs {
        message_count: Some(4),
        min_size_mb: Some(0),
        max_size_mb: Some(0),
        pause_ms: Some(0),
        ..Default::default()
    };
    let consumer = ConsumerArgs {
        consumer_threads: Some(2),
        poll_interval_ms: Some(20),
        ..Default::default()
    };

    let sender_config = sender.resolve(&broker)?;
    let consumer_config = consumer.resolve(&broker)?;
    let connection = connect(&consumer_config.broker, None).await?;

    let summary = tokio::time::timeout(
        Duration::from_secs(5),
        run_loopback(
            sender_config,
            consumer_config,
            connection,
            StopTriggers::default(),
        ),
    )
    .await??;

    assert_eq!(summary.send.messages_sent, 4);
    assert_eq!(summary.consume.failed_workers, 2);
    assert_eq!(summary.consume.final_report.total_messages, 0);
    Ok(())
}

#[tokio::test]
async fn test_summary_written_as_json() -> Result<(), Box<dyn std::error::Error>> {
    let broker = broker_args("loopback-json");
    let sender = SenderArgs {
        message_count: Some(2),
        min_size_mb: Some(0),
        max_size_mb: Some(0),
        pause_ms: Some(0),
        ..Default::default()
    };
    let consumer = ConsumerArgs::default();

    let sender_config = sender.resolve(&broker)?;
    let consumer_config = consumer.resolve(&broker)?;
    let connection = connect(&consumer_config.broker, None).await?;
    let summary = run_loopback(
        sender_config,
        consumer_config,
        connection,
        StopTriggers::default(),
    )
    .await?;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("loopback.json");
    write_metrics(&path, "loopback", &summary)?;

    let written = std::fs::read_to_string(&path)?;
    assert!(written.contains("\"messages_sent\": 2"));
    assert!(written.contains("\"mode\": \"push\""));
    Ok(())
}
