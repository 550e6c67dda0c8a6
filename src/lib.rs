//! punchsync - attendance reconciliation and punch forwarding for biometric
//! terminals.
//!
//! This library turns raw clock-in/clock-out punches into daily attendance
//! sessions and forwards individual punches to a remote collector exactly
//! once per admissible event (at least once across crashes).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          punchsync                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │   Device    │──▶│ Reconciler  │──▶│   Export    │         │
//! │  │   (link)    │   │ (sessions)  │   │ (csv/json)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐         │
//! │  │    Sync     │──▶│  Admission  │──▶│ Dispatcher  │         │
//! │  │  Scheduler  │   │   Policy    │   │  (gateway)  │         │
//! │  └─────────────┘   └─────────────┘   └─────────────┘         │
//! │         │                                                    │
//! │         ▼                                                    │
//! │  ┌─────────────┐   ┌─────────────┐                           │
//! │  │  Watermark  │   │   Monitor   │                           │
//! │  │    Store    │   │  (status)   │                           │
//! │  └─────────────┘   └─────────────┘                           │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use punchsync::{core, device};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let terminal = device::FileDevice::new("punches.json", chrono_tz::Africa::Lagos);
//! let link = device::DeviceLink::new();
//! link.connect(&terminal, &device::DeviceTarget::new("192.168.1.201", 4370))
//!     .await?;
//!
//! let sessions = core::reconcile_link(&link, None).await?;
//! println!("{} sessions", sessions.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod device;
pub mod export;
pub mod gateway;
pub mod sync;

#[cfg(feature = "server")]
pub mod server;

// Re-export key types at crate root for convenience
pub use config::{Config, ConfigError};
pub use crate::core::{reconcile, reconcile_link, AdmissionPolicy, AttendanceSession, DateRange};
pub use device::{DeviceLink, DeviceSession, PunchType, RawPunch, UserDirectory};
pub use gateway::{DispatchError, Dispatcher, GatewayConfig, PunchEvent};
pub use sync::{
    FailurePolicy, FileWatermarkStore, SchedulerConfig, SyncCycleResult, SyncScheduler,
    SyncStatus, WatermarkStore,
};

#[cfg(feature = "gateway")]
pub use gateway::HttpDispatcher;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
