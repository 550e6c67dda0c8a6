//! Durable storage for the sync watermark.
//!
//! The watermark is the timestamp of the newest punch known to have been
//! forwarded. An absent watermark means nothing has been forwarded yet.
//!
//! The file holds a single ISO-8601 timestamp. Timestamps written without an
//! offset are read in the store's timezone.

use crate::device::parse_device_timestamp;
use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Watermark persistence errors.
#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("could not write watermark to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("watermark store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for a single watermark timestamp.
///
/// `load` never fails: unreadable state is reported as `None` so the
/// scheduler starts from the beginning of recorded history.
pub trait WatermarkStore: Send + Sync {
    fn load(&self) -> Option<DateTime<FixedOffset>>;

    fn save(&self, watermark: &DateTime<FixedOffset>) -> Result<(), WatermarkError>;
}

/// Watermark kept in a text file as an ISO-8601 timestamp.
///
/// Writes always include the offset. Reads also accept naive timestamps,
/// localized in the configured timezone (UTC unless set).
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
    timezone: Tz,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timezone: Tz::UTC,
        }
    }

    /// Timezone for watermarks stored without an offset.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the stored watermark so the next run forwards everything.
    pub fn clear(&self) -> Result<(), WatermarkError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WatermarkError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn io_error(&self, source: std::io::Error) -> WatermarkError {
        WatermarkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn load(&self) -> Option<DateTime<FixedOffset>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = ?self.path, "Could not read watermark: {e}");
                return None;
            }
        };

        match parse_device_timestamp(&content, self.timezone) {
            Ok(watermark) => Some(watermark),
            Err(e) => {
                tracing::warn!(path = ?self.path, "Ignoring corrupt watermark: {e}");
                None
            }
        }
    }

    fn save(&self, watermark: &DateTime<FixedOffset>) -> Result<(), WatermarkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }

        // Write-then-rename so a crash never leaves a truncated file behind
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, watermark.to_rfc3339()).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// In-memory watermark store.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    value: Mutex<Option<DateTime<FixedOffset>>>,
}

impl MemoryWatermarkStore {
    pub fn new(initial: Option<DateTime<FixedOffset>>) -> Self {
        Self {
            value: Mutex::new(initial),
        }
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn load(&self) -> Option<DateTime<FixedOffset>> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save(&self, watermark: &DateTime<FixedOffset>) -> Result<(), WatermarkError> {
        *self.value.lock().unwrap_or_else(|e| e.into_inner()) = Some(*watermark);
        Ok(())
    }
}
