//! Sender and consumer pools against one broker in a single process.

use crate::stop::{spawn_stop_triggers, StopTriggers};
use loadtest_consumer::{ConsumeSummary, ConsumerWorkerPool};
use loadtest_core::{ConsumerConfig, SenderConfig};
use loadtest_sender::{ProducerWorkerPool, SendSummary};
use queue_client::Connection;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct LoopbackSummary {
    pub send: SendSummary,
    pub consume: ConsumeSummary,
}

/// Start consumers, send every message, wait until all sent messages were
/// received, then stop the consumers.
///
/// The wait also ends when a stop trigger fires or every consumer worker has
/// exited on its own.
pub async fn run_loopback(
    sender: SenderConfig,
    consumer: ConsumerConfig,
    connection: Arc<dyn Connection>,
    triggers: StopTriggers,
) -> anyhow::Result<LoopbackSummary> {
    let poll_interval = consumer.poll_interval;
    let consumers = ConsumerWorkerPool::new(consumer, Arc::clone(&connection)).start()?;
    let consumer_stop = consumers.stop_handle();
    let trigger_task = spawn_stop_triggers(consumer_stop.clone(), triggers);

    let producers = ProducerWorkerPool::new(sender, connection).start()?;
    let producer_stop = producers.stop_handle();
    let consumer_token = consumer_stop.token();
    let forward = tokio::spawn(async move {
        consumer_token.cancelled().await;
        producer_stop.request_stop();
    });

    let send = producers.wait().await?;
    forward.abort();

    let aggregator = consumers.aggregator();
    loop {
        let totals = aggregator.totals();
        let consumed = totals.total_messages();
        if consumed + totals.failed_messages() >= send.messages_sent {
            info!(
                "All {} sent messages received ({} unreadable)",
                send.messages_sent,
                totals.failed_messages()
            );
            break;
        }
        if consumer_stop.is_stop_requested() {
            warn!(
                "Stopped before draining: {consumed} of {} sent messages consumed",
                send.messages_sent
            );
            break;
        }
        if consumers.active_workers() == 0 {
            error!(
                "No consumer worker left: {consumed} of {} sent messages consumed",
                send.messages_sent
            );
            break;
        }
        tokio::time::sleep(poll_interval).await;
    }

    consumers.request_stop();
    let consume = consumers.wait_for_stopped().await;
    trigger_task.abort();

    Ok(LoopbackSummary { send, consume })
}
