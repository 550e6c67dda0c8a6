//! Reconciliation of raw punches into daily attendance sessions.
//!
//! Punches are grouped per user and calendar day. Within a day the first
//! check-in opens the session and the last check-out after it closes the
//! session. Days without a check-in produce no session.

use crate::device::{DeviceError, DeviceLink, RawPunch, UserDirectory};
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// A range covering a single day.
    pub fn day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Whether the timestamp falls between the start of `start` and the end
    /// of `end`, both in the timestamp's own offset.
    pub fn contains(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        let date = timestamp.date_naive();
        date >= self.start && date <= self.end
    }
}

/// A reconciled per-user, per-day attendance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSession {
    pub user_id: String,
    pub user_name: String,
    pub date: NaiveDate,
    pub check_in: Option<DateTime<FixedOffset>>,
    pub check_out: Option<DateTime<FixedOffset>>,
    /// Worked hours; absent while the session has no check-out
    pub duration_hours: Option<f64>,
}

impl AttendanceSession {
    /// Whether the session still lacks a check-out.
    pub fn is_open(&self) -> bool {
        self.check_out.is_none()
    }
}

/// Reconciliation errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("invalid date range: {start} is after {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("punch #{index} at {timestamp} has no user id")]
    MissingUserId {
        index: usize,
        timestamp: DateTime<FixedOffset>,
    },

    #[error("not connected to a device")]
    NotConnected,

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Session being accumulated for the current (user, day) group.
#[derive(Debug)]
struct OpenGroup {
    user_id: String,
    date: NaiveDate,
    check_in: Option<DateTime<FixedOffset>>,
    check_out: Option<DateTime<FixedOffset>>,
}

impl OpenGroup {
    fn new(punch: &RawPunch) -> Self {
        Self {
            user_id: punch.user_id.clone(),
            date: punch.date(),
            check_in: None,
            check_out: None,
        }
    }

    fn matches(&self, punch: &RawPunch) -> bool {
        self.user_id == punch.user_id && self.date == punch.date()
    }

    fn apply(&mut self, punch: &RawPunch) {
        if punch.punch_type.is_in() {
            if self.check_in.is_none() {
                self.check_in = Some(punch.timestamp);
            }
        } else if punch.punch_type.is_out() && self.check_in.is_some() {
            self.check_out = Some(punch.timestamp);
        }
    }
}

/// Groups punches sorted by `(user_id, timestamp)` into sessions.
pub struct SessionGrouper<'a> {
    directory: &'a UserDirectory,
    current: Option<OpenGroup>,
    completed: Vec<AttendanceSession>,
}

impl<'a> SessionGrouper<'a> {
    pub fn new(directory: &'a UserDirectory) -> Self {
        Self {
            directory,
            current: None,
            completed: Vec::new(),
        }
    }

    /// Feed the next punch in `(user_id, timestamp)` order.
    pub fn process_punch(&mut self, punch: &RawPunch) {
        let boundary = self
            .current
            .as_ref()
            .map(|group| !group.matches(punch))
            .unwrap_or(true);

        if boundary {
            self.complete_current_group();
            self.current = Some(OpenGroup::new(punch));
        }

        if let Some(ref mut group) = self.current {
            group.apply(punch);
        }
    }

    /// Finalize the group in progress and return every completed session.
    pub fn finish(mut self) -> Vec<AttendanceSession> {
        self.complete_current_group();
        self.completed
    }

    fn complete_current_group(&mut self) {
        let Some(group) = self.current.take() else {
            return;
        };
        // Days without a check-in are dropped
        let Some(check_in) = group.check_in else {
            return;
        };

        let duration_hours = group
            .check_out
            .map(|out| (out - check_in).num_milliseconds() as f64 / 3_600_000.0);

        self.completed.push(AttendanceSession {
            user_name: self.directory.name_of(&group.user_id).to_string(),
            user_id: group.user_id,
            date: group.date,
            check_in: Some(check_in),
            check_out: group.check_out,
            duration_hours,
        });
    }
}

/// Reconcile raw punches into one session per user and calendar day.
///
/// The input may be unordered and contain duplicates. Output is ordered by
/// user id, then date.
pub fn reconcile(
    punches: &[RawPunch],
    directory: &UserDirectory,
    range: Option<DateRange>,
) -> Result<Vec<AttendanceSession>, ReconcileError> {
    if let Some(range) = range {
        if range.start > range.end {
            return Err(ReconcileError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
    }

    if let Some((index, punch)) = punches
        .iter()
        .enumerate()
        .find(|(_, p)| p.user_id.trim().is_empty())
    {
        return Err(ReconcileError::MissingUserId {
            index,
            timestamp: punch.timestamp,
        });
    }

    let mut selected: Vec<&RawPunch> = punches
        .iter()
        .filter(|p| range.map(|r| r.contains(&p.timestamp)).unwrap_or(true))
        .collect();
    selected.sort_by(|a, b| {
        a.user_id
            .cmp(&b.user_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut grouper = SessionGrouper::new(directory);
    for punch in selected {
        grouper.process_punch(punch);
    }

    Ok(grouper.finish())
}

/// Fetch punches from the connected device and reconcile them.
pub async fn reconcile_link(
    link: &DeviceLink,
    range: Option<DateRange>,
) -> Result<Vec<AttendanceSession>, ReconcileError> {
    let session = link.session().ok_or(ReconcileError::NotConnected)?;
    let directory = link.directory();

    let punches = session.list_punches().await?;
    tracing::info!(records = punches.len(), "Retrieved attendance records");

    let sessions = reconcile(&punches, &directory, range)?;
    tracing::info!(sessions = sessions.len(), "Grouped attendance records");
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceUser, PunchType};

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    fn punch(user: &str, at: &str, punch_type: PunchType) -> RawPunch {
        RawPunch::new(user, ts(at), punch_type)
    }

    fn directory() -> UserDirectory {
        vec![DeviceUser {
            user_id: "U1".to_string(),
            name: "Ada".to_string(),
        }]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_first_in_last_out() {
        let punches = vec![
            punch("U1", "2024-01-01T17:30:00+01:00", PunchType::Out),
            punch("U1", "2024-01-01T08:05:00+01:00", PunchType::In),
            punch("U1", "2024-01-01T17:00:00+01:00", PunchType::Out),
            punch("U1", "2024-01-01T08:00:00+01:00", PunchType::In),
        ];

        let sessions = reconcile(&punches, &directory(), None).unwrap();
        assert_eq!(sessions.len(), 1);

        let session = &sessions[0];
        assert_eq!(session.user_name, "Ada");
        assert_eq!(session.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(session.check_in, Some(ts("2024-01-01T08:00:00+01:00")));
        assert_eq!(session.check_out, Some(ts("2024-01-01T17:30:00+01:00")));
        assert_eq!(session.duration_hours, Some(9.5));
    }

    #[test]
    fn test_out_only_day_is_dropped() {
        let punches = vec![punch("U2", "2024-01-01T17:00:00+01:00", PunchType::Out)];
        assert!(reconcile(&punches, &directory(), None).unwrap().is_empty());
    }

    #[test]
    fn test_out_before_first_in_is_ignored() {
        let punches = vec![
            punch("U1", "2024-01-01T07:00:00+01:00", PunchType::Out),
            punch("U1", "2024-01-01T09:00:00+01:00", PunchType::In),
        ];

        let sessions = reconcile(&punches, &directory(), None).unwrap();
        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_open());
        assert_eq!(sessions[0].duration_hours, None);
    }

    #[test]
    fn test_unknown_user_and_unknown_punch() {
        let punches = vec![
            punch("U9", "2024-01-02T08:00:00+01:00", PunchType::In),
            punch("U9", "2024-01-02T12:00:00+01:00", PunchType::Unknown(4)),
            punch("U9", "2024-01-02T16:00:00+01:00", PunchType::Out),
            punch("U9", "2024-01-03T08:00:00+01:00", PunchType::Unknown(4)),
        ];

        let sessions = reconcile(&punches, &directory(), None).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].user_name, "Unknown");
        assert_eq!(sessions[0].duration_hours, Some(8.0));
    }

    #[test]
    fn test_groups_ordered_by_user_then_date() {
        let punches = vec![
            punch("U2", "2024-01-01T08:00:00+01:00", PunchType::In),
            punch("U1", "2024-01-02T08:00:00+01:00", PunchType::In),
            punch("U1", "2024-01-01T08:00:00+01:00", PunchType::In),
        ];

        let sessions = reconcile(&punches, &directory(), None).unwrap();
        let keys: Vec<(&str, u32)> = sessions
            .iter()
            .map(|s| (s.user_id.as_str(), chrono::Datelike::day(&s.date)))
            .collect();
        assert_eq!(keys, vec![("U1", 1), ("U1", 2), ("U2", 1)]);
    }

    #[test]
    fn test_range_filter_is_inclusive_of_whole_days() {
        let punches = vec![
            punch("U1", "2024-01-01T00:00:00+01:00", PunchType::In),
            punch("U1", "2024-01-02T23:59:59+01:00", PunchType::In),
            punch("U1", "2024-01-03T00:00:00+01:00", PunchType::In),
        ];
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );

        let sessions = reconcile(&punches, &directory(), Some(range)).unwrap();
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn test_invalid_input_is_a_typed_failure() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        );
        assert!(matches!(
            reconcile(&[], &directory(), Some(range)),
            Err(ReconcileError::InvalidRange { .. })
        ));

        let punches = vec![punch(" ", "2024-01-01T08:00:00+01:00", PunchType::In)];
        assert!(matches!(
            reconcile(&punches, &directory(), None),
            Err(ReconcileError::MissingUserId { index: 0, .. })
        ));
    }

    #[test]
    fn test_empty_input_and_idempotence() {
        assert!(reconcile(&[], &directory(), None).unwrap().is_empty());

        let punches = vec![
            punch("U1", "2024-01-01T08:00:00+01:00", PunchType::In),
            punch("U1", "2024-01-01T08:00:00+01:00", PunchType::In),
            punch("U1", "2024-01-01T12:00:00+01:00", PunchType::Out),
        ];
        let first = reconcile(&punches, &directory(), None).unwrap();
        let second = reconcile(&punches, &directory(), None).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].duration_hours, Some(4.0));
    }
}
