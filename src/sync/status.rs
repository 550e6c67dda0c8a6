//! Observable sync status.
//!
//! The scheduler is the only writer. Foreground callers (CLI, reporting
//! server) read a consistent snapshot at any time.

use crate::sync::scheduler::SyncCycleResult;
use chrono::{DateTime, FixedOffset, Local, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Scheduler lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Result of the most recent dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchStatus {
    Delivered { status: u16, at: DateTime<Utc> },
    Rejected { status: u16, at: DateTime<Utc> },
    Failed { message: String, at: DateTime<Utc> },
}

impl std::fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchStatus::Delivered { status, at } | DispatchStatus::Rejected { status, at } => {
                write!(
                    f,
                    "{} → Status {status}",
                    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
                )
            }
            DispatchStatus::Failed { message, .. } => write!(f, "Error: {message}"),
        }
    }
}

/// Point-in-time view of the sync scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SchedulerState,
    /// Current watermark: newest punch known to be forwarded
    pub last_sync_time: Option<DateTime<FixedOffset>>,
    pub last_dispatch_status: Option<DispatchStatus>,
    pub last_cycle: Option<SyncCycleResult>,
    pub cycles_completed: u64,
    pub events_sent_total: u64,
    pub events_failed_total: u64,
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Snapshot {
    state: SchedulerState,
    last_sync_time: Option<DateTime<FixedOffset>>,
    last_dispatch_status: Option<DispatchStatus>,
    last_cycle: Option<SyncCycleResult>,
    started_at: Option<DateTime<Utc>>,
}

/// Status cell shared between the scheduler and its readers.
#[derive(Debug)]
pub struct SyncMonitor {
    cycles_completed: AtomicU64,
    events_sent: AtomicU64,
    events_failed: AtomicU64,
    snapshot: Mutex<Snapshot>,
}

impl SyncMonitor {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            events_sent: AtomicU64::new(0),
            events_failed: AtomicU64::new(0),
            snapshot: Mutex::new(Snapshot {
                state: SchedulerState::Stopped,
                last_sync_time: None,
                last_dispatch_status: None,
                last_cycle: None,
                started_at: None,
            }),
        }
    }

    /// Record a scheduler start with the watermark it loaded.
    pub fn record_started(&self, watermark: Option<DateTime<FixedOffset>>) {
        let mut snapshot = self.lock();
        snapshot.state = SchedulerState::Running;
        snapshot.last_sync_time = watermark;
        snapshot.started_at = Some(Utc::now());
    }

    pub fn record_stopped(&self) {
        self.lock().state = SchedulerState::Stopped;
    }

    /// Record the outcome of a single dispatch attempt.
    pub fn record_dispatch(&self, status: DispatchStatus) {
        match status {
            DispatchStatus::Delivered { .. } => self.events_sent.fetch_add(1, Ordering::Relaxed),
            _ => self.events_failed.fetch_add(1, Ordering::Relaxed),
        };
        self.lock().last_dispatch_status = Some(status);
    }

    pub fn record_watermark(&self, watermark: DateTime<FixedOffset>) {
        self.lock().last_sync_time = Some(watermark);
    }

    pub fn record_cycle(&self, result: SyncCycleResult) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.lock().last_cycle = Some(result);
    }

    /// Get a consistent view of the current status.
    pub fn snapshot(&self) -> SyncStatus {
        let snapshot = self.lock();
        SyncStatus {
            state: snapshot.state,
            last_sync_time: snapshot.last_sync_time,
            last_dispatch_status: snapshot.last_dispatch_status.clone(),
            last_cycle: snapshot.last_cycle.clone(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            events_sent_total: self.events_sent.load(Ordering::Relaxed),
            events_failed_total: self.events_failed.load(Ordering::Relaxed),
            started_at: snapshot.started_at,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let status = self.snapshot();
        format!(
            "Sync Statistics:\n\
             - Cycles completed: {}\n\
             - Events sent: {}\n\
             - Events failed: {}\n\
             - Last sync time: {}\n\
             - Last dispatch: {}",
            status.cycles_completed,
            status.events_sent_total,
            status.events_failed_total,
            status
                .last_sync_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
            status
                .last_dispatch_status
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string()),
        )
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SyncMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared sync monitor.
pub type SharedSyncMonitor = Arc<SyncMonitor>;

/// Create a new shared sync monitor.
pub fn create_shared_monitor() -> SharedSyncMonitor {
    Arc::new(SyncMonitor::new())
}
