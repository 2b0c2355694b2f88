//! Worker lifecycle and graceful shutdown.
//!
//! A [`ShutdownCoordinator`] owns every worker task of one pool and the
//! pool's state:
//!
//! ```text
//! consumer:  Running ──request_stop()──▶ StopRequested ──join-all──▶ Stopped
//! producer:  Running ─────────────────────────────────join-all──▶ Completed
//! ```
//!
//! Cancellation is cooperative. Workers receive a [`CancellationToken`] at
//! spawn time and must check it at every suspension point; the coordinator
//! never aborts a task.

use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Lifecycle state of a worker pool. There is no transition out of a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Running,
    StopRequested,
    Stopped,
    Completed,
}

impl PoolState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PoolState::Stopped | PoolState::Completed)
    }
}

impl std::fmt::Display for PoolState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolState::Running => write!(f, "running"),
            PoolState::StopRequested => write!(f, "stop-requested"),
            PoolState::Stopped => write!(f, "stopped"),
            PoolState::Completed => write!(f, "completed"),
        }
    }
}

/// Cloneable handle that can request a pool to stop from anywhere
/// (signal handlers, deadlines, operator input).
#[derive(Clone)]
pub struct StopHandle {
    token: CancellationToken,
    state: Arc<watch::Sender<PoolState>>,
}

impl StopHandle {
    /// Signal every worker to leave its loop.
    ///
    /// Returns `true` if this call moved the pool from `Running` to `StopRequested`.
    pub fn request_stop(&self) -> bool {
        let transitioned = self.state.send_if_modified(|state| {
            if *state == PoolState::Running {
                *state = PoolState::StopRequested;
                true
            } else {
                false
            }
        });
        self.token.cancel();
        transitioned
    }

    pub fn is_stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn state(&self) -> PoolState {
        *self.state.borrow()
    }

    /// Token observed by the workers.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Outcome of one worker task after the join-all barrier.
#[derive(Debug)]
pub struct WorkerExit<T> {
    pub worker_id: usize,
    /// `Err` if the task panicked
    pub outcome: Result<T, JoinError>,
}

/// Spawns workers, propagates the stop signal and join-waits for all of them.
pub struct ShutdownCoordinator<T> {
    stop: StopHandle,
    workers: Vec<(usize, JoinHandle<T>)>,
}

impl<T: Send + 'static> ShutdownCoordinator<T> {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PoolState::Running);
        Self {
            stop: StopHandle {
                token: CancellationToken::new(),
                state: Arc::new(state),
            },
            workers: Vec::new(),
        }
    }

    /// Spawn a worker task. The closure receives the pool's cancellation token.
    pub fn spawn<F, Fut>(&mut self, worker_id: usize, worker: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(worker(self.stop.token()));
        self.workers.push((worker_id, handle));
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn request_stop(&self) -> bool {
        self.stop.request_stop()
    }

    pub fn state(&self) -> PoolState {
        self.stop.state()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.stop.state.subscribe()
    }

    /// Workers whose task has not finished yet.
    pub fn active_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    /// Join-all barrier for pools that finish on their own.
    ///
    /// Ends in `Completed`, or `Stopped` if a stop was requested meanwhile.
    pub async fn wait_for_completion(mut self) -> Vec<WorkerExit<T>> {
        let exits = self.join_all().await;
        let terminal = if self.stop.is_stop_requested() {
            PoolState::Stopped
        } else {
            PoolState::Completed
        };
        self.stop.state.send_replace(terminal);
        exits
    }

    /// Join-all barrier for pools that run until told to stop. Ends in `Stopped`.
    pub async fn wait_for_stopped(mut self) -> Vec<WorkerExit<T>> {
        let exits = self.join_all().await;
        self.stop.state.send_replace(PoolState::Stopped);
        exits
    }

    async fn join_all(&mut self) -> Vec<WorkerExit<T>> {
        let mut exits = Vec::with_capacity(self.workers.len());
        for (worker_id, handle) in self.workers.drain(..) {
            let outcome = handle.await;
            match &outcome {
                Ok(_) => debug!("Worker {worker_id} joined"),
                Err(e) => warn!("Worker {worker_id} terminated abnormally: {e}"),
            }
            exits.push(WorkerExit { worker_id, outcome });
        }
        exits
    }
}

impl<T: Send + 'static> Default for ShutdownCoordinator<T> {
    fn default() -> Self {
        Self::new()
    }
}
