//! Throughput statistics shared by all consumer workers.
//!
//! Workers bump [`RunningTotals`] with lock-free atomic increments. The worker
//! whose increment lands exactly on a multiple of the stats interval emits a
//! periodic report; one more report is emitted at shutdown. Reports read the
//! counters without locking, so a snapshot may be slightly stale.
//!
//! Process memory is sampled by a background task ([`spawn_memory_sampler`])
//! and periodic reports use the last sample, so emitting one never inspects
//! the process table from a worker.

use chrono::{DateTime, Utc};
use loadtest_core::BYTES_PER_MB;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Cumulative message and byte counters. All only ever grow.
#[derive(Debug)]
pub struct RunningTotals {
    total_messages: AtomicU64,
    total_bytes: AtomicU64,
    failed_messages: AtomicU64,
    started: Instant,
    started_at: DateTime<Utc>,
}

impl RunningTotals {
    pub fn new() -> Self {
        Self {
            total_messages: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            failed_messages: AtomicU64::new(0),
            started: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Count one message of `size_bytes`. Returns the new message total.
    pub fn record(&self, size_bytes: u64) -> u64 {
        // Bytes first, so a report triggered by this message includes them
        self.total_bytes.fetch_add(size_bytes, Ordering::Relaxed);
        self.total_messages.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Count one message that was received but could not be read.
    pub fn record_failure(&self) -> u64 {
        self.failed_messages.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages.load(Ordering::Acquire)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    pub fn failed_messages(&self) -> u64 {
        self.failed_messages.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

impl Default for RunningTotals {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a report was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportTrigger {
    /// Message total crossed a multiple of the stats interval
    Interval,
    /// Final report when the pool stops
    Shutdown,
}

/// Point-in-time throughput figures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThroughputReport {
    pub trigger: ReportTrigger,
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub total_mb: f64,
    pub elapsed_ms: u64,
    pub messages_per_second: f64,
    pub mb_per_second: f64,
    /// Resident memory of this process in MB
    pub memory_used_mb: u64,
}

impl ThroughputReport {
    /// Compute rates from elapsed milliseconds. Rates are 0 when no time has elapsed.
    pub fn new(
        trigger: ReportTrigger,
        total_messages: u64,
        total_bytes: u64,
        elapsed: Duration,
        started_at: DateTime<Utc>,
        memory_used_mb: u64,
    ) -> Self {
        let elapsed_ms = elapsed.as_millis() as u64;
        let total_mb = total_bytes as f64 / BYTES_PER_MB as f64;
        let (messages_per_second, mb_per_second) = if elapsed_ms == 0 {
            (0.0, 0.0)
        } else {
            let seconds = elapsed_ms as f64 / 1000.0;
            (total_messages as f64 / seconds, total_mb / seconds)
        };

        Self {
            trigger,
            timestamp: Utc::now(),
            started_at,
            total_messages,
            total_bytes,
            total_mb,
            elapsed_ms,
            messages_per_second,
            mb_per_second,
            memory_used_mb,
        }
    }

    pub fn log(&self) {
        let label = match self.trigger {
            ReportTrigger::Interval => "Statistics",
            ReportTrigger::Shutdown => "Final statistics",
        };
        info!(
            "{label}: {} messages, {:.2} MB in {:.1}s ({:.2} msg/s, {:.2} MB/s), \
             memory used: {} MB",
            self.total_messages,
            self.total_mb,
            self.elapsed_ms as f64 / 1000.0,
            self.messages_per_second,
            self.mb_per_second,
            self.memory_used_mb
        );
    }
}

/// Current resident memory of this process in MB, or 0 if it cannot be sampled.
///
/// Only this process is refreshed. Still a blocking call; async callers go
/// through `spawn_blocking`.
pub fn process_memory_used_mb() -> u64 {
    use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[pid]),
        true,
        ProcessRefreshKind::new().with_memory(),
    );
    sys.process(pid)
        .map(|process| process.memory() / BYTES_PER_MB)
        .unwrap_or(0)
}

/// Refresh `aggregator`'s memory figure every `every` until the task is aborted.
///
/// The first sample is taken immediately.
pub fn spawn_memory_sampler(
    aggregator: Arc<StatisticsAggregator>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match tokio::task::spawn_blocking(process_memory_used_mb).await {
                Ok(mb) => aggregator.set_memory_used_mb(mb),
                Err(e) => debug!("Memory sample failed: {e}"),
            }
        }
    })
}

/// Aggregates counts from every consumer worker and emits throughput reports.
pub struct StatisticsAggregator {
    totals: Arc<RunningTotals>,
    stats_interval: u64,
    reports_emitted: AtomicU64,
    memory_used_mb: AtomicU64,
}

impl StatisticsAggregator {
    /// `stats_interval` of 0 disables periodic reports.
    pub fn new(stats_interval: u64) -> Self {
        Self {
            totals: Arc::new(RunningTotals::new()),
            stats_interval,
            reports_emitted: AtomicU64::new(0),
            memory_used_mb: AtomicU64::new(0),
        }
    }

    /// Record one consumed message. Returns the periodic report if this message
    /// completed a multiple of the stats interval.
    pub fn record_message(&self, size_bytes: u64) -> Option<ThroughputReport> {
        let count = self.totals.record(size_bytes);
        if self.stats_interval > 0 && count % self.stats_interval == 0 {
            Some(self.emit(ReportTrigger::Interval))
        } else {
            None
        }
    }

    /// Count one message that could not be read.
    pub fn record_failure(&self) {
        self.totals.record_failure();
    }

    /// Unconditional report at shutdown, using the latest memory sample.
    pub fn final_report(&self) -> ThroughputReport {
        self.emit(ReportTrigger::Shutdown)
    }

    pub fn totals(&self) -> &RunningTotals {
        &self.totals
    }

    pub fn reports_emitted(&self) -> u64 {
        self.reports_emitted.load(Ordering::Relaxed)
    }

    /// Last sampled process memory in MB.
    pub fn memory_used_mb(&self) -> u64 {
        self.memory_used_mb.load(Ordering::Relaxed)
    }

    pub fn set_memory_used_mb(&self, mb: u64) {
        self.memory_used_mb.store(mb, Ordering::Relaxed);
    }

    fn emit(&self, trigger: ReportTrigger) -> ThroughputReport {
        let report = ThroughputReport::new(
            trigger,
            self.totals.total_messages(),
            self.totals.total_bytes(),
            self.totals.elapsed(),
            self.totals.started_at(),
            self.memory_used_mb(),
        );
        report.log();
        self.reports_emitted.fetch_add(1, Ordering::Relaxed);
        report
    }
}
