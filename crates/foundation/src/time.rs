/// Time primitives
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

/// A closed `[start, stop]` availability interval.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, stop: DateTime<Utc>) -> Self {
        Self { start, stop }
    }

    pub fn instant(t: DateTime<Utc>) -> Self {
        Self { start: t, stop: t }
    }

    pub fn duration(&self) -> Duration {
        (self.stop - self.start).max(Duration::zero())
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.stop
    }
}

/// Parses the date/time shapes found in tabular data.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` (both read as
/// UTC) and bare `YYYY-MM-DD` dates (midnight UTC). Anything else is `None`.
pub fn parse_date_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// ISO 8601 rendering with second precision, e.g. `2015-08-02T23:59:59Z`.
pub fn format_date_time(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
