//! Punch and user types as reported by an attendance terminal.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display name used when a punch references a user the device does not know.
pub const UNKNOWN_USER: &str = "Unknown";

/// Punch state as recorded by the terminal.
///
/// Terminals report a numeric code: `0` for check-in and `1` for check-out.
/// Any other code is kept as [`PunchType::Unknown`] and ignored by the
/// reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum PunchType {
    In,
    Out,
    Unknown(i32),
}

impl PunchType {
    pub fn code(&self) -> i32 {
        match self {
            PunchType::In => 0,
            PunchType::Out => 1,
            PunchType::Unknown(code) => *code,
        }
    }

    pub fn is_in(&self) -> bool {
        matches!(self, PunchType::In)
    }

    pub fn is_out(&self) -> bool {
        matches!(self, PunchType::Out)
    }
}

impl From<i32> for PunchType {
    fn from(code: i32) -> Self {
        match code {
            0 => PunchType::In,
            1 => PunchType::Out,
            other => PunchType::Unknown(other),
        }
    }
}

impl From<PunchType> for i32 {
    fn from(punch: PunchType) -> Self {
        punch.code()
    }
}

impl std::fmt::Display for PunchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PunchType::In => write!(f, "Check In"),
            PunchType::Out => write!(f, "Check Out"),
            PunchType::Unknown(code) => write!(f, "Unknown Punch ({code})"),
        }
    }
}

/// A single clock-in or clock-out event recorded by the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPunch {
    /// Device-side user identifier
    pub user_id: String,
    /// When the punch happened, in the device's local offset
    pub timestamp: DateTime<FixedOffset>,
    /// Check-in, check-out or an unrecognised state
    #[serde(rename = "punch")]
    pub punch_type: PunchType,
}

impl RawPunch {
    pub fn new(
        user_id: impl Into<String>,
        timestamp: DateTime<FixedOffset>,
        punch_type: PunchType,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            timestamp,
            punch_type,
        }
    }

    /// Calendar date of the punch in its own offset.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// A user enrolled on the terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUser {
    pub user_id: String,
    pub name: String,
}

/// Lookup table from user id to display name.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    names: HashMap<String, String>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user_id: impl Into<String>, name: impl Into<String>) {
        self.names.insert(user_id.into(), name.into());
    }

    /// Resolve a display name, falling back to [`UNKNOWN_USER`].
    pub fn name_of(&self, user_id: &str) -> &str {
        self.names
            .get(user_id)
            .map(String::as_str)
            .unwrap_or(UNKNOWN_USER)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<DeviceUser> for UserDirectory {
    fn from_iter<I: IntoIterator<Item = DeviceUser>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(|u| (u.user_id, u.name)).collect(),
        }
    }
}
