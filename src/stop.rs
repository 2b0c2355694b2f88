//! External stop triggers for a worker pool.
//!
//! Whichever enabled trigger fires first requests the stop; the trigger task
//! ends as soon as the pool's stop has been requested by anyone.

use loadtest_core::StopHandle;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct StopTriggers {
    /// Process interrupt signal
    pub ctrl_c: bool,
    /// A line (Enter) on standard input
    pub enter_key: bool,
    /// Stop after this long
    pub deadline: Option<Duration>,
}

/// Spawn a task that requests `stop` once a trigger fires.
pub fn spawn_stop_triggers(stop: StopHandle, triggers: StopTriggers) -> JoinHandle<()> {
    tokio::spawn(async move {
        let token = stop.token();
        let reason = tokio::select! {
            _ = token.cancelled() => return,
            _ = interrupt_signal(triggers.ctrl_c) => "interrupt signal (Ctrl+C)",
            _ = enter_pressed(triggers.enter_key) => "operator input",
            _ = deadline(triggers.deadline) => "run duration elapsed",
        };

        info!("Received {reason}, stopping");
        stop.request_stop();
    })
}

async fn interrupt_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
}

async fn enter_pressed(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }

    // A plain thread, so a blocked read never holds up runtime shutdown
    let (tx, rx) = tokio::sync::oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        if let Ok(n) = std::io::stdin().read_line(&mut line) {
            // EOF (n == 0) never counts as a key press
            if n > 0 {
                let _ = tx.send(());
            }
        }
    });

    if rx.await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn deadline(after: Option<Duration>) {
    match after {
        Some(after) => tokio::time::sleep(after).await,
        None => std::future::pending().await,
    }
}
