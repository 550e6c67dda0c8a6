//! Device source contracts.
//!
//! The terminal wire protocol is outside this crate. Anything that can open a
//! session and list users and punches can act as a source.

use crate::device::types::{DeviceUser, RawPunch};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default TCP port of ZKTeco-style terminals.
pub const DEFAULT_DEVICE_PORT: u16 = 4370;

/// Where and how to reach a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTarget {
    pub address: String,
    pub port: u16,
    pub timeout: Duration,
    /// Communication key configured on the terminal (0 when unset)
    pub password: u32,
}

impl DeviceTarget {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
            timeout: Duration::from_secs(5),
            password: 0,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Errors reported by a device source.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not connect to device at {endpoint}: {message}")]
    Connection { endpoint: String, message: String },

    #[error("device read failed: {0}")]
    Read(String),

    #[error("malformed device record: {0}")]
    Parse(String),

    #[error("device session is closed")]
    Closed,
}

/// Opens sessions with a terminal.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, target: &DeviceTarget) -> Result<Arc<dyn DeviceSession>, DeviceError>;
}

/// An open session with a terminal.
///
/// Every listing call returns a full snapshot of what the device holds. Records
/// are not guaranteed to be ordered and may repeat across calls.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    async fn list_users(&self) -> Result<Vec<DeviceUser>, DeviceError>;

    async fn list_punches(&self) -> Result<Vec<RawPunch>, DeviceError>;

    async fn close(&self) -> Result<(), DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_defaults() {
        let target = DeviceTarget::new("192.168.1.201", DEFAULT_DEVICE_PORT);
        assert_eq!(target.endpoint(), "192.168.1.201:4370");
        assert_eq!(target.timeout, Duration::from_secs(5));
        assert_eq!(target.password, 0);
    }
}
