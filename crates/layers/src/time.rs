use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use foundation::TimeInterval;

use crate::symbology::{DEFAULT_DISPLAY_DURATION_MINUTES, TimeStyleDef};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimeSettings {
    pub spread_start_time: bool,
    pub spread_finish_time: bool,
    pub display_duration_minutes: f64,
}

impl From<&TimeStyleDef> for TimeSettings {
    fn from(def: &TimeStyleDef) -> Self {
        Self {
            spread_start_time: def.spread_start_time,
            spread_finish_time: def.spread_finish_time,
            display_duration_minutes: def
                .display_duration
                .unwrap_or(DEFAULT_DISPLAY_DURATION_MINUTES),
        }
    }
}

/// Splits rows into groups by a key; rows with equal keys form one feature
/// over time. Groups keep first-seen order and row order within a group.
pub fn group_rows<K: Ord>(keys: impl IntoIterator<Item = K>) -> Vec<Vec<usize>> {
    let mut slots: BTreeMap<K, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (row, key) in keys.into_iter().enumerate() {
        let next = groups.len();
        let slot = *slots.entry(key).or_insert(next);
        if slot == groups.len() {
            groups.push(Vec::new());
        }
        groups[slot].push(row);
    }
    groups
}

/// Availability interval per row.
///
/// Inside a group each row is shown from its own time until one second before
/// the group's next later time; the latest row lasts for the display
/// duration. `spread_start_time` moves every start back to the earliest time
/// in the table and `spread_finish_time` moves every stop out to the latest
/// stop. Rows without a parseable time get `None`.
pub fn compute_time_intervals(
    times: &[Option<DateTime<Utc>>],
    groups: &[Vec<usize>],
    settings: TimeSettings,
) -> Vec<Option<TimeInterval>> {
    let one_second = Duration::seconds(1);
    let display = Duration::milliseconds((settings.display_duration_minutes * 60_000.0) as i64);
    let mut intervals: Vec<Option<TimeInterval>> = vec![None; times.len()];

    for group in groups {
        let mut dated: Vec<(usize, DateTime<Utc>)> = group
            .iter()
            .filter_map(|&row| times.get(row).copied().flatten().map(|t| (row, t)))
            .collect();
        dated.sort_by_key(|(_, t)| *t);

        for (k, (row, start)) in dated.iter().enumerate() {
            let next = dated[k + 1..].iter().map(|(_, t)| *t).find(|t| t > start);
            let stop = match next {
                Some(next) => next - one_second,
                None => *start + display - one_second,
            };
            intervals[*row] = Some(TimeInterval::new(*start, stop.max(*start)));
        }
    }

    if settings.spread_start_time {
        if let Some(earliest) = intervals.iter().flatten().map(|i| i.start).min() {
            for interval in intervals.iter_mut().flatten() {
                interval.start = earliest;
            }
        }
    }
    if settings.spread_finish_time {
        if let Some(latest) = intervals.iter().flatten().map(|i| i.stop).max() {
            for interval in intervals.iter_mut().flatten() {
                interval.stop = latest;
            }
        }
    }
    intervals
}

/// True unless the table has at least two distinct intervals and two distinct
/// times.
pub fn date_time_selector_disabled(
    times: &[Option<DateTime<Utc>>],
    intervals: &[Option<TimeInterval>],
) -> bool {
    let distinct_times: BTreeSet<DateTime<Utc>> = times.iter().flatten().copied().collect();
    let distinct_intervals: BTreeSet<(DateTime<Utc>, DateTime<Utc>)> = intervals
        .iter()
        .flatten()
        .map(|i| (i.start, i.stop))
        .collect();
    distinct_times.len() < 2 || distinct_intervals.len() < 2
}
