//! Device source backed by an attendance dump on disk.
//!
//! Terminals and their vendor tools can export the attendance log and user
//! list. This source reads such a dump as JSON:
//!
//! ```json
//! {
//!   "users":   [{ "user_id": "1", "name": "Ada" }],
//!   "punches": [{ "user_id": "1", "timestamp": "2024-01-01 08:00:00", "punch": 0 }]
//! }
//! ```
//!
//! Device clocks usually have no notion of timezone, so naive timestamps are
//! localized in the configured timezone. RFC 3339 timestamps are kept as is.
//! The file is re-read on every listing so the dump can be refreshed while a
//! session is open.

use crate::device::source::{DeviceConnector, DeviceError, DeviceSession, DeviceTarget};
use crate::device::types::{DeviceUser, PunchType, RawPunch};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// `%.f` also matches when the fractional part is absent
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Deserialize)]
struct DumpFile {
    #[serde(default)]
    users: Vec<DeviceUser>,
    #[serde(default)]
    punches: Vec<DumpPunch>,
}

#[derive(Debug, Deserialize)]
struct DumpPunch {
    user_id: serde_json::Value,
    timestamp: String,
    punch: i32,
}

/// Connector for attendance dumps.
#[derive(Debug, Clone)]
pub struct FileDevice {
    path: PathBuf,
    timezone: Tz,
}

impl FileDevice {
    pub fn new(path: impl Into<PathBuf>, timezone: Tz) -> Self {
        Self {
            path: path.into(),
            timezone,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DeviceConnector for FileDevice {
    async fn connect(&self, target: &DeviceTarget) -> Result<Arc<dyn DeviceSession>, DeviceError> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Err(DeviceError::Connection {
                endpoint: target.endpoint(),
                message: format!("attendance dump {:?} not found", self.path),
            });
        }

        Ok(Arc::new(FileSession {
            path: self.path.clone(),
            timezone: self.timezone,
            closed: AtomicBool::new(false),
        }))
    }
}

/// Session over an attendance dump.
pub struct FileSession {
    path: PathBuf,
    timezone: Tz,
    closed: AtomicBool,
}

impl FileSession {
    async fn read_dump(&self) -> Result<DumpFile, DeviceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DeviceError::Closed);
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| DeviceError::Read(format!("{:?}: {e}", self.path)))?;

        serde_json::from_str(&content).map_err(|e| DeviceError::Parse(e.to_string()))
    }
}

#[async_trait]
impl DeviceSession for FileSession {
    async fn list_users(&self) -> Result<Vec<DeviceUser>, DeviceError> {
        Ok(self.read_dump().await?.users)
    }

    async fn list_punches(&self) -> Result<Vec<RawPunch>, DeviceError> {
        self.read_dump()
            .await?
            .punches
            .into_iter()
            .map(|p| {
                Ok(RawPunch {
                    user_id: user_id_string(&p.user_id)?,
                    timestamp: parse_device_timestamp(&p.timestamp, self.timezone)?,
                    punch_type: PunchType::from(p.punch),
                })
            })
            .collect()
    }

    async fn close(&self) -> Result<(), DeviceError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Terminals report user ids either as numbers or strings.
fn user_id_string(value: &serde_json::Value) -> Result<String, DeviceError> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(DeviceError::Parse(format!("invalid user_id {other}"))),
    }
}

/// Parse a device timestamp, localizing naive values in `timezone`.
pub fn parse_device_timestamp(raw: &str, timezone: Tz) -> Result<DateTime<FixedOffset>, DeviceError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| DeviceError::Parse(format!("unrecognised timestamp '{raw}'")))?;

    timezone
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.fixed_offset())
        .ok_or_else(|| DeviceError::Parse(format!("'{raw}' does not exist in {timezone}")))
}
