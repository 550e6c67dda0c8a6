//! Forwarding of punches to the remote collector.
//!
//! The scheduler polls the device, filters punches through the admission
//! policy, dispatches them and checkpoints progress in a watermark store.
//! Its progress is observable through the shared monitor.

pub mod scheduler;
pub mod status;
pub mod watermark;

// Re-export commonly used types
pub use scheduler::{
    FailurePolicy, SchedulerConfig, SchedulerHandle, SyncCycleResult, SyncScheduler,
};
pub use status::{
    create_shared_monitor, DispatchStatus, SchedulerState, SharedSyncMonitor, SyncMonitor,
    SyncStatus,
};
pub use watermark::{FileWatermarkStore, MemoryWatermarkStore, WatermarkError, WatermarkStore};
