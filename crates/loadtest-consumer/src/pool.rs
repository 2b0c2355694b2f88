//! Consumer worker pool.
//!
//! Every worker opens its own session and consumer and drains messages until
//! the pool is told to stop:
//!
//! - push mode: a listener callback processes each message while the worker
//!   idles in a poll loop checking the stop token
//! - pull mode: the worker loops over a bounded receive
//!
//! Per-message failures are logged and the worker moves on. Session and
//! consumer are released on every exit path.

use crate::drain::{drain_message, DrainOutcome};
use crate::error::Result;
use crate::stats::{
    process_memory_used_mb, spawn_memory_sampler, StatisticsAggregator, ThroughputReport,
};
use async_trait::async_trait;
use loadtest_core::{
    ConsumeMode, ConsumerConfig, PoolState, ShutdownCoordinator, StopHandle, BYTES_PER_MB,
};
use queue_client::{
    spawn_listener, Connection, Destination, Error, Message, MessageConsumer, MessageListener,
    Session,
};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// How often process memory is sampled for periodic reports.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one consumer worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsumerWorkerReport {
    pub worker_id: usize,
    pub messages_received: u64,
    pub bytes_received: u64,
    pub read_failures: u64,
    pub receive_failures: u64,
    /// Error that kept the worker from consuming at all
    pub error: Option<String>,
}

/// Outcome of a consumer run.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeSummary {
    pub mode: ConsumeMode,
    pub state: PoolState,
    pub final_report: ThroughputReport,
    pub reports_emitted: u64,
    pub failed_workers: usize,
    pub workers: Vec<ConsumerWorkerReport>,
}

struct WorkerContext {
    connection: Arc<dyn Connection>,
    destination: Destination,
    mode: ConsumeMode,
    receive_timeout: Duration,
    poll_interval: Duration,
    read_buffer_bytes: usize,
    aggregator: Arc<StatisticsAggregator>,
}

/// Pool of consumer workers draining one destination until stopped.
pub struct ConsumerWorkerPool {
    config: ConsumerConfig,
    connection: Arc<dyn Connection>,
}

impl ConsumerWorkerPool {
    pub fn new(config: ConsumerConfig, connection: Arc<dyn Connection>) -> Self {
        Self { config, connection }
    }

    /// Spawn the workers. They run until [`RunningConsumerPool::request_stop`].
    pub fn start(self) -> Result<RunningConsumerPool> {
        self.config.validate()?;

        let aggregator = Arc::new(StatisticsAggregator::new(self.config.stats_interval));
        let context = Arc::new(WorkerContext {
            connection: self.connection,
            destination: Destination::new(self.config.broker.destination.clone()),
            mode: self.config.mode,
            receive_timeout: self.config.receive_timeout,
            poll_interval: self.config.poll_interval,
            read_buffer_bytes: self.config.read_buffer_bytes,
            aggregator: Arc::clone(&aggregator),
        });

        info!(
            "Consuming from '{}' with {} workers in {} mode",
            context.destination, self.config.thread_count, self.config.mode
        );

        let sampler = spawn_memory_sampler(Arc::clone(&aggregator), MEMORY_SAMPLE_INTERVAL);

        let mut coordinator = ShutdownCoordinator::new();
        for worker_id in 0..self.config.thread_count {
            let context = Arc::clone(&context);
            coordinator.spawn(worker_id, move |token| run_worker(worker_id, context, token));
        }

        Ok(RunningConsumerPool {
            coordinator,
            aggregator,
            sampler,
            mode: self.config.mode,
        })
    }
}

/// Handle to a running consumer pool.
pub struct RunningConsumerPool {
    coordinator: ShutdownCoordinator<ConsumerWorkerReport>,
    aggregator: Arc<StatisticsAggregator>,
    sampler: JoinHandle<()>,
    mode: ConsumeMode,
}

impl RunningConsumerPool {
    /// Cloneable handle for stop triggers living elsewhere (signals, stdin, deadlines).
    pub fn stop_handle(&self) -> StopHandle {
        self.coordinator.stop_handle()
    }

    /// Ask every worker to leave its loop. Returns `false` if already requested.
    pub fn request_stop(&self) -> bool {
        let requested = self.coordinator.request_stop();
        if requested {
            info!("Stop requested, waiting for consumer workers to finish");
        }
        requested
    }

    pub fn state(&self) -> PoolState {
        self.coordinator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.coordinator.subscribe()
    }

    pub fn aggregator(&self) -> Arc<StatisticsAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Workers still running. Reaches 0 early if every worker failed.
    pub fn active_workers(&self) -> usize {
        self.coordinator.active_workers()
    }

    /// Join-all barrier, then the final statistics report.
    ///
    /// Returns once every worker has exited, which happens within one poll
    /// interval (push) or one receive timeout (pull) of [`Self::request_stop`].
    pub async fn wait_for_stopped(self) -> ConsumeSummary {
        let exits = self.coordinator.wait_for_stopped().await;
        self.sampler.abort();
        match tokio::task::spawn_blocking(process_memory_used_mb).await {
            Ok(mb) => self.aggregator.set_memory_used_mb(mb),
            Err(e) => debug!("Final memory sample failed: {e}"),
        }

        let workers: Vec<ConsumerWorkerReport> = exits
            .into_iter()
            .map(|exit| match exit.outcome {
                Ok(report) => report,
                Err(e) => ConsumerWorkerReport {
                    worker_id: exit.worker_id,
                    error: Some(format!("worker task failed: {e}")),
                    ..Default::default()
                },
            })
            .collect();

        let final_report = self.aggregator.final_report();
        info!("All consumer workers stopped.");

        ConsumeSummary {
            mode: self.mode,
            state: PoolState::Stopped,
            reports_emitted: self.aggregator.reports_emitted(),
            failed_workers: workers.iter().filter(|w| w.error.is_some()).count(),
            final_report,
            workers,
        }
    }
}

/// Per-worker message handling, shared by both modes.
///
/// Draining reads the whole body, so it runs on the blocking pool against the
/// shared [`HandlerState`].
struct WorkerHandler {
    state: Arc<HandlerState>,
}

struct HandlerState {
    worker_id: usize,
    buffer: Mutex<Vec<u8>>,
    aggregator: Arc<StatisticsAggregator>,
    messages: AtomicU64,
    bytes: AtomicU64,
    read_failures: AtomicU64,
    receive_failures: AtomicU64,
}

impl WorkerHandler {
    fn new(
        worker_id: usize,
        read_buffer_bytes: usize,
        aggregator: Arc<StatisticsAggregator>,
    ) -> Self {
        Self {
            state: Arc::new(HandlerState {
                worker_id,
                buffer: Mutex::new(vec![0u8; read_buffer_bytes]),
                aggregator,
                messages: AtomicU64::new(0),
                bytes: AtomicU64::new(0),
                read_failures: AtomicU64::new(0),
                receive_failures: AtomicU64::new(0),
            }),
        }
    }

    fn worker_id(&self) -> usize {
        self.state.worker_id
    }

    async fn process(&self, message: Message) {
        let state = Arc::clone(&self.state);
        if let Err(e) = tokio::task::spawn_blocking(move || state.drain(message)).await {
            error!(
                "Consumer worker {}: message processing task failed: {e}",
                self.worker_id()
            );
            self.state.read_failed();
        }
    }

    fn receive_failed(&self, e: Error) {
        error!("Consumer worker {}: failed to receive message: {e}", self.worker_id());
        self.state.receive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn report(&self, error: Option<String>) -> ConsumerWorkerReport {
        let state = &self.state;
        ConsumerWorkerReport {
            worker_id: state.worker_id,
            messages_received: state.messages.load(Ordering::Relaxed),
            bytes_received: state.bytes.load(Ordering::Relaxed),
            read_failures: state.read_failures.load(Ordering::Relaxed),
            receive_failures: state.receive_failures.load(Ordering::Relaxed),
            error,
        }
    }
}

impl HandlerState {
    fn drain(&self, mut message: Message) {
        let worker_id = self.worker_id;
        let drained = {
            let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
            drain_message(&mut message, &mut buffer)
        };

        let size_bytes = match drained {
            Ok(DrainOutcome::Binary { size_bytes, chunks }) => {
                info!(
                    "Consumer worker {worker_id}: message received and discarded: \
                     size = {:.2} MB ({size_bytes} bytes)",
                    size_bytes as f64 / BYTES_PER_MB as f64
                );
                trace!("Consumer worker {worker_id}: read in {chunks} chunks");
                size_bytes
            }
            Ok(DrainOutcome::NonBinary) => {
                info!(
                    "Consumer worker {worker_id}: message received and discarded: {}",
                    message.describe()
                );
                0
            }
            Err(e) => {
                error!(
                    "Consumer worker {worker_id}: failed to read {}: {e}",
                    message.describe()
                );
                self.read_failed();
                return;
            }
        };

        self.messages.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.aggregator.record_message(size_bytes);
    }

    fn read_failed(&self) {
        self.read_failures.fetch_add(1, Ordering::Relaxed);
        self.aggregator.record_failure();
    }
}

#[async_trait]
impl MessageListener for WorkerHandler {
    async fn on_message(&self, message: Message) {
        self.process(message).await;
    }

    fn on_error(&self, error: Error) {
        self.receive_failed(error);
    }
}

async fn run_worker(
    worker_id: usize,
    context: Arc<WorkerContext>,
    token: CancellationToken,
) -> ConsumerWorkerReport {
    let handler = Arc::new(WorkerHandler::new(
        worker_id,
        context.read_buffer_bytes,
        Arc::clone(&context.aggregator),
    ));

    let session = match context.connection.create_session().await {
        Ok(session) => session,
        Err(e) => {
            error!("Consumer worker {worker_id}: failed to create session: {e}");
            return handler.report(Some(e.to_string()));
        }
    };

    let outcome = consume(session.as_ref(), &context, &handler, &token).await;

    if let Err(e) = session.close().await {
        warn!("Consumer worker {worker_id}: failed to close session: {e}");
    }
    debug!("Consumer worker {worker_id}: stopped");

    handler.report(outcome.err().map(|e| e.to_string()))
}

async fn consume(
    session: &dyn Session,
    context: &WorkerContext,
    handler: &Arc<WorkerHandler>,
    token: &CancellationToken,
) -> std::result::Result<(), Error> {
    let worker_id = handler.worker_id();
    let created = session.create_consumer(&context.destination).await;
    let consumer: Arc<dyn MessageConsumer> = match created {
        Ok(consumer) => Arc::from(consumer),
        Err(e) => {
            error!("Consumer worker {worker_id}: failed to create consumer: {e}");
            return Err(e);
        }
    };

    info!("Consumer worker {worker_id}: waiting for messages...");
    match context.mode {
        ConsumeMode::Push => consume_push(&consumer, context, handler, token).await,
        ConsumeMode::Pull => consume_pull(consumer.as_ref(), context, handler, token).await,
    }

    if let Err(e) = consumer.close().await {
        warn!("Consumer worker {worker_id}: failed to close consumer: {e}");
    }
    Ok(())
}

async fn consume_push(
    consumer: &Arc<dyn MessageConsumer>,
    context: &WorkerContext,
    handler: &Arc<WorkerHandler>,
    token: &CancellationToken,
) {
    let worker_id = handler.worker_id();
    let delivery = spawn_listener(
        Arc::clone(consumer),
        Arc::clone(handler),
        token.clone(),
        context.poll_interval,
    );

    // Idle until stopped; the listener does the work
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(context.poll_interval) => {
                if delivery.is_finished() {
                    warn!("Consumer worker {worker_id}: message delivery ended unexpectedly");
                    break;
                }
            }
        }
    }

    // The in-flight message, if any, is fully processed before this returns
    if let Err(e) = delivery.await {
        error!("Consumer worker {worker_id}: message delivery task failed: {e}");
    }
}

async fn consume_pull(
    consumer: &dyn MessageConsumer,
    context: &WorkerContext,
    handler: &WorkerHandler,
    token: &CancellationToken,
) {
    let worker_id = handler.worker_id();
    loop {
        let received = tokio::select! {
            _ = token.cancelled() => break,
            received = consumer.receive(context.receive_timeout) => received,
        };

        match received {
            Ok(Some(message)) => handler.process(message).await,
            Ok(None) => trace!("Consumer worker {worker_id}: no message within receive timeout"),
            Err(e) => {
                handler.receive_failed(e);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(context.poll_interval) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use loadtest_core::{BrokerSettings, ProviderUrl};
    use queue_client::{BytesMessage, Connector, MemoryBroker};
    use std::time::Instant;

    fn config(mode: ConsumeMode, thread_count: usize) -> ConsumerConfig {
        ConsumerConfig {
            broker: BrokerSettings {
                provider: ProviderUrl::Memory("consumer-test".to_string()),
                principal: None,
                credentials: None,
                client_id: "test".to_string(),
                destination: "consumer-test".to_string(),
            },
            thread_count,
            stats_interval: 0,
            mode,
            receive_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(20),
            read_buffer_bytes: 64 * 1024,
            group_id: "test".to_string(),
            run_duration: None,
        }
    }

    async fn wait_for_messages(pool: &RunningConsumerPool, expected: u64) {
        let aggregator = pool.aggregator();
        for _ in 0..200 {
            if aggregator.totals().total_messages() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {expected} messages");
    }

    async fn drains_all_messages(mode: ConsumeMode) {
        let broker = MemoryBroker::new();
        let destination = Destination::new("consumer-test");
        for _ in 0..6 {
            broker.publish(
                &destination,
                Message::Bytes(BytesMessage::new(Bytes::from(vec![1u8; 200_000]))),
            );
        }
        broker.publish(&destination, Message::Text("marker".to_string()));

        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(mode, 3), connection)
            .start()
            .unwrap();
        wait_for_messages(&pool, 7).await;

        assert!(pool.request_stop());
        let summary = pool.wait_for_stopped().await;

        assert_eq!(summary.state, PoolState::Stopped);
        assert_eq!(summary.final_report.total_messages, 7);
        assert_eq!(summary.final_report.total_bytes, 6 * 200_000);
        assert_eq!(
            summary.workers.iter().map(|w| w.bytes_received).sum::<u64>(),
            6 * 200_000
        );
        assert_eq!(summary.reports_emitted, 1);
        assert!(summary.final_report.memory_used_mb > 0);
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_push_mode_drains_all_messages() {
        drains_all_messages(ConsumeMode::Push).await;
    }

    #[tokio::test]
    async fn test_pull_mode_drains_all_messages() {
        drains_all_messages(ConsumeMode::Pull).await;
    }

    #[tokio::test]
    async fn test_read_failure_does_not_stop_worker() {
        let broker = MemoryBroker::new();
        let destination = Destination::new("consumer-test");
        broker.publish(
            &destination,
            Message::Bytes(BytesMessage::with_declared_length(Bytes::from_static(b"abc"), 10)),
        );
        broker.publish(
            &destination,
            Message::Bytes(BytesMessage::new(Bytes::from_static(b"abcdef"))),
        );

        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Pull, 1), connection)
            .start()
            .unwrap();
        wait_for_messages(&pool, 1).await;
        pool.request_stop();
        let summary = pool.wait_for_stopped().await;

        assert_eq!(summary.workers[0].read_failures, 1);
        assert_eq!(summary.workers[0].messages_received, 1);
        assert_eq!(summary.final_report.total_bytes, 6);
    }

    #[tokio::test]
    async fn test_stop_latency_bounded_by_receive_timeout() {
        let broker = MemoryBroker::new();
        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Pull, 4), connection)
            .start()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let requested = Instant::now();
        pool.request_stop();
        let summary = pool.wait_for_stopped().await;

        assert!(requested.elapsed() < Duration::from_millis(200));
        assert_eq!(summary.workers.len(), 4);
        assert_eq!(summary.final_report.total_messages, 0);
    }

    #[tokio::test]
    async fn test_session_failure_is_reported() {
        let broker = MemoryBroker::new();
        broker.set_fail_sessions(true);
        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Push, 2), connection)
            .start()
            .unwrap();

        pool.request_stop();
        let summary = pool.wait_for_stopped().await;
        assert_eq!(summary.failed_workers, 2);
    }

    #[tokio::test]
    async fn test_consumer_failure_ends_every_worker() {
        let broker = MemoryBroker::new();
        broker.set_fail_consumers(true);
        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Pull, 3), connection)
            .start()
            .unwrap();

        for _ in 0..100 {
            if pool.active_workers() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(pool.active_workers(), 0);
        assert_eq!(pool.state(), PoolState::Running);

        let summary = pool.wait_for_stopped().await;
        assert_eq!(summary.failed_workers, 3);
        assert_eq!(broker.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_read_failure_counted_in_totals() {
        let broker = MemoryBroker::new();
        let destination = Destination::new("consumer-test");
        broker.publish(
            &destination,
            Message::Bytes(BytesMessage::with_declared_length(Bytes::from_static(b"ab"), 9)),
        );

        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Push, 1), connection)
            .start()
            .unwrap();
        let aggregator = pool.aggregator();
        for _ in 0..200 {
            if aggregator.totals().failed_messages() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        pool.request_stop();
        let summary = pool.wait_for_stopped().await;

        assert_eq!(aggregator.totals().failed_messages(), 1);
        assert_eq!(summary.final_report.total_messages, 0);
        assert_eq!(summary.workers[0].read_failures, 1);
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let broker = MemoryBroker::new();
        let connection = broker.connect().await.unwrap();
        let pool = ConsumerWorkerPool::new(config(ConsumeMode::Push, 1), connection)
            .start()
            .unwrap();
        let state = pool.subscribe();

        assert_eq!(pool.state(), PoolState::Running);
        assert!(pool.request_stop());
        assert_eq!(pool.state(), PoolState::StopRequested);
        assert!(!pool.request_stop());

        pool.wait_for_stopped().await;
        assert_eq!(*state.borrow(), PoolState::Stopped);
    }
}
