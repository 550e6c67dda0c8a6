//! In-process device source.
//!
//! Holds users and punches in memory so the reconciler and the sync scheduler
//! can run without a physical terminal.

use crate::device::source::{DeviceConnector, DeviceError, DeviceSession, DeviceTarget};
use crate::device::types::{DeviceUser, RawPunch};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MemoryState {
    users: Vec<DeviceUser>,
    punches: Vec<RawPunch>,
}

/// A device that lives entirely in memory.
///
/// Cloning shares the underlying records, so punches pushed after a session
/// was opened show up in the next listing.
#[derive(Debug, Clone)]
pub struct MemoryDevice {
    state: Arc<Mutex<MemoryState>>,
    reachable: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    punch_reads: Arc<AtomicUsize>,
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            reachable: Arc::new(AtomicBool::new(true)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            punch_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_records(users: Vec<DeviceUser>, punches: Vec<RawPunch>) -> Self {
        let device = Self::new();
        {
            let mut state = device.lock();
            state.users = users;
            state.punches = punches;
        }
        device
    }

    pub fn add_user(&self, user_id: impl Into<String>, name: impl Into<String>) {
        self.lock().users.push(DeviceUser {
            user_id: user_id.into(),
            name: name.into(),
        });
    }

    pub fn push_punch(&self, punch: RawPunch) {
        self.lock().punches.push(punch);
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make subsequent listings fail with a read error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of times punches were listed across all sessions.
    pub fn punch_reads(&self) -> usize {
        self.punch_reads.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DeviceConnector for MemoryDevice {
    async fn connect(&self, target: &DeviceTarget) -> Result<Arc<dyn DeviceSession>, DeviceError> {
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(DeviceError::Connection {
                endpoint: target.endpoint(),
                message: "device unreachable".to_string(),
            });
        }

        Ok(Arc::new(MemorySession {
            device: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session opened on a [`MemoryDevice`].
pub struct MemorySession {
    device: MemoryDevice,
    closed: AtomicBool,
}

impl MemorySession {
    fn check_open(&self) -> Result<(), DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }
        if self.device.fail_reads.load(Ordering::SeqCst) {
            return Err(DeviceError::Read("simulated read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceSession for MemorySession {
    async fn list_users(&self) -> Result<Vec<DeviceUser>, DeviceError> {
        self.check_open()?;
        Ok(self.device.lock().users.clone())
    }

    async fn list_punches(&self) -> Result<Vec<RawPunch>, DeviceError> {
        self.check_open()?;
        self.device.punch_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.device.lock().punches.clone())
    }

    async fn close(&self) -> Result<(), DeviceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
