//! Producer worker pool.
//!
//! Each worker opens its own session and producer on the shared connection,
//! sends its allotment of messages with a fixed pause in between, and
//! releases both resources on every exit path. The pool completes once all
//! workers have joined.

use crate::error::{Result, SenderError};
use crate::partition::{allot_messages, describe_allotments, WorkerTask};
use crate::payload::PayloadGenerator;
use loadtest_core::{PoolState, SenderConfig, ShutdownCoordinator, StopHandle, BYTES_PER_MB};
use queue_client::{Connection, Destination, MessageProducer, Session};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Result of one producer worker.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub messages_assigned: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    /// Error that ended the worker early, if any
    pub error: Option<String>,
}

/// Aggregated outcome of a producer run.
#[derive(Debug, Clone, Serialize)]
pub struct SendSummary {
    pub state: PoolState,
    pub messages_requested: u64,
    pub messages_sent: u64,
    pub bytes_sent: u64,
    pub failed_workers: usize,
    pub duration_ms: u64,
    pub workers: Vec<WorkerReport>,
}

impl SendSummary {
    pub fn total_mb(&self) -> f64 {
        self.bytes_sent as f64 / BYTES_PER_MB as f64
    }

    /// Calculate messages per second.
    pub fn messages_per_second(&self) -> f64 {
        if self.duration_ms > 0 {
            self.messages_sent as f64 * 1000.0 / self.duration_ms as f64
        } else {
            0.0
        }
    }

    pub fn mb_per_second(&self) -> f64 {
        if self.duration_ms > 0 {
            self.total_mb() * 1000.0 / self.duration_ms as f64
        } else {
            0.0
        }
    }
}

/// Everything a producer worker needs, shared read-only by all of them.
struct WorkerContext {
    connection: Arc<dyn Connection>,
    destination: Destination,
    min_size_mb: u64,
    max_size_mb: u64,
    pause: Duration,
    seed: Option<u64>,
}

/// Pool of producer workers sending `message_count` messages in total.
pub struct ProducerWorkerPool {
    config: SenderConfig,
    connection: Arc<dyn Connection>,
}

impl ProducerWorkerPool {
    pub fn new(config: SenderConfig, connection: Arc<dyn Connection>) -> Self {
        Self { config, connection }
    }

    /// Run to completion: spawn every worker and block until all have joined.
    pub async fn run(self) -> Result<SendSummary> {
        self.start()?.wait().await
    }

    /// Spawn the workers and return immediately.
    pub fn start(self) -> Result<RunningProducerPool> {
        self.config.validate()?;

        let tasks = allot_messages(self.config.message_count, self.config.thread_count);
        info!(
            "Sending {} messages ({}-{} MB) to '{}' with {} workers",
            self.config.message_count,
            self.config.min_size_mb,
            self.config.max_size_mb,
            self.config.broker.destination,
            tasks.len()
        );
        debug!("{}", describe_allotments(&tasks));

        let context = Arc::new(WorkerContext {
            connection: self.connection,
            destination: Destination::new(self.config.broker.destination.clone()),
            min_size_mb: self.config.min_size_mb,
            max_size_mb: self.config.max_size_mb,
            pause: self.config.pause,
            seed: self.config.seed,
        });

        let started = Instant::now();
        let mut coordinator = ShutdownCoordinator::new();
        for task in tasks.iter().copied() {
            let context = Arc::clone(&context);
            coordinator.spawn(task.worker_id, move |token| {
                run_worker(task, context, token)
            });
        }

        Ok(RunningProducerPool {
            coordinator,
            tasks,
            messages_requested: self.config.message_count,
            started,
        })
    }
}

/// Handle to a producer pool whose workers are running.
pub struct RunningProducerPool {
    coordinator: ShutdownCoordinator<WorkerReport>,
    tasks: Vec<WorkerTask>,
    messages_requested: u64,
    started: Instant,
}

impl RunningProducerPool {
    /// Handle for abandoning the remaining allotments early (e.g. on Ctrl+C).
    pub fn stop_handle(&self) -> StopHandle {
        self.coordinator.stop_handle()
    }

    pub fn state(&self) -> PoolState {
        self.coordinator.state()
    }

    /// Join-all barrier. Worker failures are reported in the summary, never raised.
    pub async fn wait(self) -> Result<SendSummary> {
        let stop = self.coordinator.stop_handle();
        let exits = self.coordinator.wait_for_completion().await;

        let mut workers = Vec::with_capacity(exits.len());
        for exit in exits {
            let report = match exit.outcome {
                Ok(report) => report,
                Err(e) => WorkerReport {
                    worker_id: exit.worker_id,
                    messages_assigned: self
                        .tasks
                        .get(exit.worker_id)
                        .map(|t| t.messages_to_process)
                        .unwrap_or_default(),
                    error: Some(format!("worker task failed: {e}")),
                    ..Default::default()
                },
            };
            workers.push(report);
        }

        let summary = SendSummary {
            state: stop.state(),
            messages_requested: self.messages_requested,
            messages_sent: workers.iter().map(|w| w.messages_sent).sum(),
            bytes_sent: workers.iter().map(|w| w.bytes_sent).sum(),
            failed_workers: workers.iter().filter(|w| w.error.is_some()).count(),
            duration_ms: self.started.elapsed().as_millis() as u64,
            workers,
        };

        if summary.state == PoolState::Completed && summary.failed_workers == 0 {
            info!("All messages sent.");
        }
        info!(
            "Sent {}/{} messages, {:.2} MB in {} ms ({:.2} msg/s, {:.2} MB/s), {} failed workers",
            summary.messages_sent,
            summary.messages_requested,
            summary.total_mb(),
            summary.duration_ms,
            summary.messages_per_second(),
            summary.mb_per_second(),
            summary.failed_workers
        );
        Ok(summary)
    }
}

async fn run_worker(
    task: WorkerTask,
    context: Arc<WorkerContext>,
    token: CancellationToken,
) -> WorkerReport {
    let worker_id = task.worker_id;
    let mut report = WorkerReport {
        worker_id,
        messages_assigned: task.messages_to_process,
        ..Default::default()
    };

    let session = match context.connection.create_session().await {
        Ok(session) => session,
        Err(e) => {
            error!("Worker {worker_id}: failed to create session: {e}");
            report.error = Some(e.to_string());
            return report;
        }
    };

    if let Err(e) = send_allotment(session.as_ref(), &task, &context, &token, &mut report).await {
        report.error = Some(e.to_string());
    }

    if let Err(e) = session.close().await {
        warn!("Worker {worker_id}: failed to close session: {e}");
    }
    debug!(
        "Worker {worker_id}: finished, {} of {} messages sent",
        report.messages_sent, report.messages_assigned
    );
    report
}

async fn send_allotment(
    session: &dyn Session,
    task: &WorkerTask,
    context: &WorkerContext,
    token: &CancellationToken,
    report: &mut WorkerReport,
) -> Result<()> {
    let worker_id = task.worker_id;
    let producer = session
        .create_producer(&context.destination)
        .await
        .map_err(|e| {
            error!("Worker {worker_id}: failed to create producer: {e}");
            e
        })?;

    let result = send_messages(producer.as_ref(), task, context, token, report).await;

    if let Err(e) = producer.close().await {
        warn!("Worker {worker_id}: failed to close producer: {e}");
    }
    result
}

async fn send_messages(
    producer: &dyn MessageProducer,
    task: &WorkerTask,
    context: &WorkerContext,
    token: &CancellationToken,
    report: &mut WorkerReport,
) -> Result<()> {
    let worker_id = task.worker_id;
    let seed = context.seed.map(|seed| seed.wrapping_add(worker_id as u64));
    let mut generator = PayloadGenerator::new(context.min_size_mb, context.max_size_mb, seed)?;

    for sequence in 1..=task.messages_to_process {
        if token.is_cancelled() {
            info!(
                "Worker {worker_id}: stop requested, abandoning {} remaining messages",
                task.messages_to_process - sequence + 1
            );
            break;
        }

        // Large payloads are filled off the async scheduler
        let (returned, payload) = tokio::task::spawn_blocking(move || {
            let payload = generator.generate();
            (generator, payload)
        })
        .await?;
        generator = returned;
        let payload = payload?;

        let size_bytes = payload.size_bytes();
        if let Err(e) = producer.send(payload.data).await {
            error!(
                "Worker {worker_id}: failed to send message {sequence} \
                 ({} MB, {size_bytes} bytes): {e}",
                payload.size_mb
            );
            return Err(SenderError::Broker(e));
        }

        report.messages_sent += 1;
        report.bytes_sent += size_bytes;
        info!(
            "Worker {worker_id}: message {sequence} sent: size = {} MB ({size_bytes} bytes)",
            payload.size_mb
        );

        if sequence < task.messages_to_process && !context.pause.is_zero() {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(context.pause) => {}
            }
        }
    }
    Ok(())
}
