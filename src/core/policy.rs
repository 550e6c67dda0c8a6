//! Admission policy for forwarding punches.
//!
//! A punch is forwarded only when it falls on an allowed weekday and is newer
//! than the sync watermark.

use chrono::{DateTime, Datelike, FixedOffset, Weekday};
use serde::{Deserialize, Serialize};

/// Outcome of evaluating a punch against the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Forward the punch
    Eligible,
    /// Weekday not allowed; never retried
    SkippedByPolicy,
    /// At or before the watermark; already forwarded
    AlreadySynced,
}

/// Set of weekdays on which punches are forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Weekday>", into = "Vec<Weekday>")]
pub struct AdmissionPolicy {
    /// Bit `n` set means `Weekday::num_days_from_monday() == n` is allowed
    days: u8,
}

impl AdmissionPolicy {
    pub fn new(days: impl IntoIterator<Item = Weekday>) -> Self {
        let days = days
            .into_iter()
            .fold(0u8, |mask, day| mask | (1 << day.num_days_from_monday()));
        Self { days }
    }

    /// Every day of the week.
    pub fn all_days() -> Self {
        Self { days: 0b111_1111 }
    }

    pub fn allows_day(&self, day: Weekday) -> bool {
        self.days & (1 << day.num_days_from_monday()) != 0
    }

    pub fn allows(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        self.allows_day(timestamp.weekday())
    }

    /// Evaluate a punch against the policy and the current watermark.
    pub fn admit(
        &self,
        timestamp: &DateTime<FixedOffset>,
        watermark: Option<&DateTime<FixedOffset>>,
    ) -> Admission {
        if !self.allows(timestamp) {
            return Admission::SkippedByPolicy;
        }
        match watermark {
            Some(mark) if timestamp <= mark => Admission::AlreadySynced,
            _ => Admission::Eligible,
        }
    }

    /// Allowed days starting from Monday.
    pub fn days(&self) -> Vec<Weekday> {
        let mut day = Weekday::Mon;
        let mut days = Vec::new();
        for _ in 0..7 {
            if self.allows_day(day) {
                days.push(day);
            }
            day = day.succ();
        }
        days
    }
}

impl Default for AdmissionPolicy {
    /// Sunday, Monday, Wednesday and Friday.
    fn default() -> Self {
        Self::new([Weekday::Sun, Weekday::Mon, Weekday::Wed, Weekday::Fri])
    }
}

impl From<Vec<Weekday>> for AdmissionPolicy {
    fn from(days: Vec<Weekday>) -> Self {
        Self::new(days)
    }
}

impl From<AdmissionPolicy> for Vec<Weekday> {
    fn from(policy: AdmissionPolicy) -> Self {
        policy.days()
    }
}

impl std::fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let days: Vec<String> = self.days().iter().map(|d| d.to_string()).collect();
        write!(f, "{}", days.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_default_days() {
        let policy = AdmissionPolicy::default();
        assert_eq!(
            policy.days(),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri, Weekday::Sun]
        );
        assert!(!policy.allows_day(Weekday::Tue));
        assert!(!policy.allows_day(Weekday::Sat));
    }

    #[test]
    fn test_admission() {
        let policy = AdmissionPolicy::new([Weekday::Mon]);
        // 2024-01-01 is a Monday
        let monday = ts("2024-01-01T08:00:00+01:00");
        let tuesday = ts("2024-01-02T08:00:00+01:00");

        assert_eq!(policy.admit(&monday, None), Admission::Eligible);
        assert_eq!(policy.admit(&tuesday, None), Admission::SkippedByPolicy);
        assert_eq!(policy.admit(&monday, Some(&monday)), Admission::AlreadySynced);
        assert_eq!(
            policy.admit(&monday, Some(&ts("2024-01-01T07:59:59+01:00"))),
            Admission::Eligible
        );
    }

    #[test]
    fn test_weekday_uses_punch_offset() {
        // Monday 00:30 in Lagos is still Sunday in UTC
        let policy = AdmissionPolicy::new([Weekday::Mon]);
        assert!(policy.allows(&ts("2024-01-01T00:30:00+01:00")));
    }

    #[test]
    fn test_serde_as_weekday_list() {
        let policy: AdmissionPolicy = serde_json::from_str(r#"["Mon","Fri"]"#).unwrap();
        assert!(policy.allows_day(Weekday::Fri));
        assert_eq!(serde_json::to_string(&policy).unwrap(), r#"["Mon","Fri"]"#);
        assert_eq!(policy.to_string(), "Mon, Fri");
    }
}
