use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use gapfill_core::SceneRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Younger than the grace period; ingestion may still catch up.
    Expected,
    Stale,
    /// No acquisition date to age the gap by.
    Unclassifiable,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Expected, Severity::Stale, Severity::Unclassifiable];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Expected => "expected",
            Severity::Stale => "stale",
            Severity::Unclassifiable => "unclassifiable",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider scene with no indexed counterpart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub record: SceneRecord,
    pub age_days: Option<i64>,
    pub severity: Severity,
}

/// Age and severity of a scene acquired on `acquired`, as of `today`.
///
/// `age == grace` is still expected; a future date (negative age) is expected.
pub fn severity_for(acquired: Option<NaiveDate>, today: NaiveDate, grace_period_days: u32) -> (Option<i64>, Severity) {
    match acquired {
        None => (None, Severity::Unclassifiable),
        Some(date) => {
            let age = (today - date).num_days();
            let severity = if age <= i64::from(grace_period_days) {
                Severity::Expected
            } else {
                Severity::Stale
            };
            (Some(age), severity)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn grace_boundary() {
        let today = d("2023-01-10");
        assert_eq!(severity_for(Some(d("2023-01-07")), today, 3), (Some(3), Severity::Expected));
        assert_eq!(severity_for(Some(d("2023-01-06")), today, 3), (Some(4), Severity::Stale));
    }

    #[test]
    fn future_and_missing_dates() {
        let today = d("2023-01-10");
        assert_eq!(severity_for(Some(d("2023-01-12")), today, 0), (Some(-2), Severity::Expected));
        assert_eq!(severity_for(None, today, 3), (None, Severity::Unclassifiable));
    }
}
