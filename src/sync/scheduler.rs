//! Watermark-driven sync scheduler.
//!
//! Every poll interval the scheduler takes a full snapshot of the device's
//! punches, admits the ones on allowed weekdays that are newer than the
//! watermark, forwards them one by one in timestamp order, and checkpoints the
//! newest forwarded timestamp.
//!
//! Delivery is at-least-once: a crash or a failed checkpoint between dispatch
//! and persistence causes the affected punches to be sent again after restart.

use crate::core::{Admission, AdmissionPolicy};
use crate::device::{DeviceLink, RawPunch};
use crate::gateway::{DispatchError, Dispatcher, PunchEvent};
use crate::sync::status::{
    create_shared_monitor, DispatchStatus, SharedSyncMonitor, SyncStatus,
};
use crate::sync::watermark::WatermarkStore;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How the watermark treats dispatch failures within a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The watermark moves to the newest success even when an older punch
    /// failed in the same cycle. The failed punch is then never retried.
    #[default]
    AdvancePastFailures,
    /// The watermark stops short of the oldest failure so it is retried on
    /// the next cycle.
    HoldAtFirstFailure,
}

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub poll_interval: Duration,
    pub policy: AdmissionPolicy,
    pub failure_policy: FailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            policy: AdmissionPolicy::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncCycleResult {
    /// The device was unavailable and nothing was attempted
    pub skipped: bool,
    pub events_considered: usize,
    pub events_sent: usize,
    pub events_skipped_by_policy: usize,
    pub events_already_synced: usize,
    pub events_failed: usize,
    pub new_watermark: Option<DateTime<FixedOffset>>,
    pub last_error: Option<String>,
}

/// Forwards punches from a device to a dispatcher on a fixed interval.
pub struct SyncScheduler {
    config: SchedulerConfig,
    store: Arc<dyn WatermarkStore>,
    dispatcher: Arc<dyn Dispatcher>,
    link: DeviceLink,
    monitor: SharedSyncMonitor,
    watermark: Option<DateTime<FixedOffset>>,
}

impl SyncScheduler {
    /// Create a scheduler, reading the persisted watermark once.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn WatermarkStore>,
        dispatcher: Arc<dyn Dispatcher>,
        link: DeviceLink,
    ) -> Self {
        let watermark = store.load();
        Self {
            config,
            store,
            dispatcher,
            link,
            monitor: create_shared_monitor(),
            watermark,
        }
    }

    /// Report status through an existing monitor.
    pub fn with_monitor(mut self, monitor: SharedSyncMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn monitor(&self) -> SharedSyncMonitor {
        Arc::clone(&self.monitor)
    }

    /// In-memory watermark.
    pub fn watermark(&self) -> Option<DateTime<FixedOffset>> {
        self.watermark
    }

    /// Run a single poll cycle.
    ///
    /// Never fails: errors are recorded in the result and the monitor so the
    /// loop survives them.
    pub async fn run_cycle(&mut self) -> SyncCycleResult {
        let mut result = SyncCycleResult::default();

        let Some(session) = self.link.session() else {
            tracing::info!("Not connected, skipping sync cycle");
            result.skipped = true;
            return result;
        };

        let mut punches = match session.list_punches().await {
            Ok(punches) => punches,
            Err(e) => {
                tracing::warn!("Sync error: {e}");
                result.last_error = Some(e.to_string());
                return result;
            }
        };
        punches.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        result.events_considered = punches.len();

        let mut successes: Vec<DateTime<FixedOffset>> = Vec::new();
        let mut first_failure: Option<DateTime<FixedOffset>> = None;

        for punch in &punches {
            match self.config.policy.admit(&punch.timestamp, self.watermark.as_ref()) {
                Admission::SkippedByPolicy => {
                    result.events_skipped_by_policy += 1;
                    tracing::debug!(
                        reason = "policy",
                        user_id = %punch.user_id,
                        timestamp = %punch.timestamp,
                        "Skipping log for {}",
                        punch.timestamp.format("%A")
                    );
                    continue;
                }
                Admission::AlreadySynced => {
                    result.events_already_synced += 1;
                    continue;
                }
                Admission::Eligible => {}
            }

            match self.dispatch(punch).await {
                Ok(()) => {
                    result.events_sent += 1;
                    successes.push(punch.timestamp);
                }
                Err(e) => {
                    result.events_failed += 1;
                    result.last_error = Some(e.to_string());
                    first_failure.get_or_insert(punch.timestamp);
                }
            }
        }

        let candidate = self.candidate_watermark(&successes, first_failure);
        if let Some(new_mark) = candidate {
            if let Err(e) = self.store.save(&new_mark) {
                // In-memory state still advances; a restart may resend
                tracing::error!("Error saving last sync time: {e}");
                result.last_error = Some(e.to_string());
            }
            self.watermark = Some(new_mark);
            self.monitor.record_watermark(new_mark);
            result.new_watermark = Some(new_mark);
            tracing::info!(watermark = %new_mark, "Updated last sync time");
        }

        result
    }

    async fn dispatch(&self, punch: &RawPunch) -> Result<(), DispatchError> {
        let event = PunchEvent::from(punch);
        match self.dispatcher.send(&event).await {
            Ok(receipt) => {
                tracing::info!(
                    user_id = %event.user_id,
                    timestamp = %event.timestamp,
                    status = receipt.status,
                    "Sent log"
                );
                self.monitor.record_dispatch(DispatchStatus::Delivered {
                    status: receipt.status,
                    at: Utc::now(),
                });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %event.user_id,
                    timestamp = %event.timestamp,
                    "Error sending log: {e}"
                );
                let at = Utc::now();
                self.monitor.record_dispatch(match e.status() {
                    Some(status) => DispatchStatus::Rejected { status, at },
                    None => DispatchStatus::Failed {
                        message: e.to_string(),
                        at,
                    },
                });
                Err(e)
            }
        }
    }

    fn candidate_watermark(
        &self,
        successes: &[DateTime<FixedOffset>],
        first_failure: Option<DateTime<FixedOffset>>,
    ) -> Option<DateTime<FixedOffset>> {
        let newest = successes.iter().max().copied();
        let Some(failed_at) = first_failure else {
            return newest;
        };

        match self.config.failure_policy {
            FailurePolicy::AdvancePastFailures => {
                if newest.map(|n| n >= failed_at).unwrap_or(false) {
                    tracing::warn!(
                        failed = %failed_at,
                        "Watermark advanced past a failed event; it will not be retried"
                    );
                }
                newest
            }
            FailurePolicy::HoldAtFirstFailure => {
                successes.iter().filter(|ts| **ts < failed_at).max().copied()
            }
        }
    }

    /// Poll until `running` is cleared.
    ///
    /// The flag is checked between cycles; a cycle in progress always runs to
    /// completion. `wake` cuts the inter-cycle sleep short.
    pub async fn run(mut self, running: Arc<AtomicBool>, wake: Arc<Notify>) {
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            allowed_days = %self.config.policy,
            watermark = ?self.watermark,
            "Starting background sync loop"
        );
        self.monitor.record_started(self.watermark);

        while running.load(Ordering::SeqCst) {
            let result = self.run_cycle().await;
            self.monitor.record_cycle(result);

            if !running.load(Ordering::SeqCst) {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = wake.notified() => {}
            }
        }

        self.monitor.record_stopped();
        tracing::info!("Background sync loop stopped");
    }

    /// Run the loop on a background task.
    pub fn spawn(self) -> SchedulerHandle {
        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let monitor = self.monitor();
        let task = tokio::spawn(self.run(Arc::clone(&running), Arc::clone(&wake)));

        SchedulerHandle {
            running,
            wake,
            monitor,
            task,
        }
    }
}

/// Handle to a spawned scheduler.
pub struct SchedulerHandle {
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    monitor: SharedSyncMonitor,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn status(&self) -> SyncStatus {
        self.monitor.snapshot()
    }

    pub fn monitor(&self) -> SharedSyncMonitor {
        Arc::clone(&self.monitor)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Request cancellation and wait for the current cycle to finish.
    pub async fn stop(self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        if let Err(e) = self.task.await {
            tracing::error!("Sync task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceTarget, MemoryDevice, PunchType};
    use crate::gateway::DispatchReceipt;
    use crate::sync::watermark::MemoryWatermarkStore;
    use async_trait::async_trait;
    use chrono::Weekday;
    use std::sync::Mutex;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    /// Records every event and fails the ones listed in `fail`.
    #[derive(Default)]
    struct RecordingDispatcher {
        sent: Mutex<Vec<PunchEvent>>,
        fail: Vec<String>,
    }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn send(&self, event: &PunchEvent) -> Result<DispatchReceipt, DispatchError> {
            self.sent.lock().unwrap().push(event.clone());
            if self.fail.contains(&event.timestamp) {
                return Err(DispatchError::Server {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(DispatchReceipt { status: 200 })
        }
    }

    async fn connected(device: &MemoryDevice) -> DeviceLink {
        let link = DeviceLink::new();
        link.connect(device, &DeviceTarget::new("memory", 4370))
            .await
            .unwrap();
        link
    }

    fn config(days: &[Weekday], failure_policy: FailurePolicy) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(10),
            policy: AdmissionPolicy::new(days.iter().copied()),
            failure_policy,
        }
    }

    #[tokio::test]
    async fn test_monday_only_policy() {
        let device = MemoryDevice::new();
        device.push_punch(RawPunch::new("1", ts("2024-01-02T08:00:00+01:00"), PunchType::In));
        device.push_punch(RawPunch::new("1", ts("2024-01-01T08:00:00+01:00"), PunchType::In));

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let store = Arc::new(MemoryWatermarkStore::default());
        let mut scheduler = SyncScheduler::new(
            config(&[Weekday::Mon], FailurePolicy::default()),
            store.clone(),
            dispatcher.clone(),
            connected(&device).await,
        );

        let result = scheduler.run_cycle().await;
        assert_eq!(result.events_considered, 2);
        assert_eq!(result.events_sent, 1);
        assert_eq!(result.events_skipped_by_policy, 1);
        assert_eq!(result.new_watermark, Some(ts("2024-01-01T08:00:00+01:00")));
        assert_eq!(store.load(), Some(ts("2024-01-01T08:00:00+01:00")));

        let sent = dispatcher.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].timestamp, "2024-01-01T08:00:00+01:00");
    }

    #[tokio::test]
    async fn test_second_cycle_sends_nothing_new() {
        let device = MemoryDevice::new();
        device.push_punch(RawPunch::new("1", ts("2024-01-01T08:00:00+01:00"), PunchType::In));

        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut scheduler = SyncScheduler::new(
            config(&[Weekday::Mon], FailurePolicy::default()),
            Arc::new(MemoryWatermarkStore::default()),
            dispatcher.clone(),
            connected(&device).await,
        );

        scheduler.run_cycle().await;
        let second = scheduler.run_cycle().await;
        assert_eq!(second.events_sent, 0);
        assert_eq!(second.events_already_synced, 1);
        assert_eq!(second.new_watermark, None);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnected_cycle_is_skipped() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let mut scheduler = SyncScheduler::new(
            SchedulerConfig::default(),
            Arc::new(MemoryWatermarkStore::default()),
            dispatcher.clone(),
            DeviceLink::new(),
        );

        let result = scheduler.run_cycle().await;
        assert!(result.skipped);
        assert_eq!(result.events_considered, 0);
        assert!(dispatcher.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_advance_past_failures() {
        let device = MemoryDevice::new();
        device.push_punch(RawPunch::new("1", ts("2024-01-01T08:00:00+01:00"), PunchType::In));
        device.push_punch(RawPunch::new("1", ts("2024-01-01T17:00:00+01:00"), PunchType::Out));

        let dispatcher = Arc::new(RecordingDispatcher {
            fail: vec!["2024-01-01T08:00:00+01:00".to_string()],
            ..Default::default()
        });
        let mut scheduler = SyncScheduler::new(
            config(&[Weekday::Mon], FailurePolicy::AdvancePastFailures),
            Arc::new(MemoryWatermarkStore::default()),
            dispatcher.clone(),
            connected(&device).await,
        );

        let result = scheduler.run_cycle().await;
        assert_eq!(result.events_failed, 1);
        assert_eq!(result.events_sent, 1);
        assert_eq!(result.new_watermark, Some(ts("2024-01-01T17:00:00+01:00")));

        // The failed morning punch is now behind the watermark
        let retry = scheduler.run_cycle().await;
        assert_eq!(retry.events_already_synced, 2);
        assert_eq!(dispatcher.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hold_at_first_failure_retries() {
        let device = MemoryDevice::new();
        device.push_punch(RawPunch::new("1", ts("2024-01-01T07:00:00+01:00"), PunchType::In));
        device.push_punch(RawPunch::new("2", ts("2024-01-01T08:00:00+01:00"), PunchType::In));
        device.push_punch(RawPunch::new("1", ts("2024-01-01T17:00:00+01:00"), PunchType::Out));

        let dispatcher = Arc::new(RecordingDispatcher {
            fail: vec!["2024-01-01T08:00:00+01:00".to_string()],
            ..Default::default()
        });
        let mut scheduler = SyncScheduler::new(
            config(&[Weekday::Mon], FailurePolicy::HoldAtFirstFailure),
            Arc::new(MemoryWatermarkStore::default()),
            dispatcher.clone(),
            connected(&device).await,
        );

        let result = scheduler.run_cycle().await;
        assert_eq!(result.events_sent, 2);
        assert_eq!(result.new_watermark, Some(ts("2024-01-01T07:00:00+01:00")));

        let retry = scheduler.run_cycle().await;
        assert_eq!(retry.events_already_synced, 1);
        assert_eq!(retry.events_failed, 1);
        assert_eq!(retry.events_sent, 1);
    }

    #[tokio::test]
    async fn test_device_read_error_is_isolated() {
        let device = MemoryDevice::new();
        let link = connected(&device).await;
        device.set_fail_reads(true);

        let mut scheduler = SyncScheduler::new(
            SchedulerConfig::default(),
            Arc::new(MemoryWatermarkStore::default()),
            Arc::new(RecordingDispatcher::default()),
            link,
        );

        let result = scheduler.run_cycle().await;
        assert!(!result.skipped);
        assert!(result.last_error.unwrap().contains("simulated"));
        assert_eq!(scheduler.watermark(), None);
    }

    #[tokio::test]
    async fn test_spawned_scheduler_stops() {
        let device = MemoryDevice::new();
        device.push_punch(RawPunch::new("1", ts("2024-01-01T08:00:00+01:00"), PunchType::In));

        let scheduler = SyncScheduler::new(
            config(&[Weekday::Mon], FailurePolicy::default()),
            Arc::new(MemoryWatermarkStore::default()),
            Arc::new(RecordingDispatcher::default()),
            connected(&device).await,
        );
        let handle = scheduler.spawn();
        let monitor = handle.monitor();

        let mut delivered = false;
        for _ in 0..500 {
            if monitor.snapshot().events_sent_total == 1 {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(delivered);
        assert!(handle.is_running());
        handle.stop().await;

        let status = monitor.snapshot();
        assert_eq!(status.state, crate::sync::status::SchedulerState::Stopped);
        assert!(status.cycles_completed >= 1);
        assert_eq!(status.events_sent_total, 1);
        assert_eq!(status.last_sync_time, Some(ts("2024-01-01T08:00:00+01:00")));
    }
}
