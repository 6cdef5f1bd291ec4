//! Duration sums over interval lists. [Aggregator] keeps the results of the expensive sums
//! between mutations of [IntervalStore](super::interval_store::IntervalStore).

use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::trace;

use crate::utils::time::day_range;

use super::{
    crop::{crop_list_to_range, crop_to_range},
    entities::TimeInterval,
    invariant::{report_violation, InvariantViolation},
};

/// Sum of durations of all closed intervals. Open intervals are skipped.
pub fn total_duration<'a>(intervals: impl IntoIterator<Item = &'a TimeInterval>) -> Duration {
    intervals
        .into_iter()
        .filter_map(closed_duration)
        .fold(Duration::zero(), |acc, next| acc + next)
}

/// Sum of durations of intervals that include `label` among their workspace names.
///
/// Intervals with different labels are not deduplicated. Time spent in two workspaces at once is
/// counted fully for each of them.
pub fn total_by_label<'a>(
    intervals: impl IntoIterator<Item = &'a TimeInterval>,
    label: &str,
    delimiter: &str,
) -> Duration {
    total_duration(
        intervals
            .into_iter()
            .filter(|v| v.has_workspace(label, delimiter)),
    )
}

/// Time spent during the day of `now`. The open interval is closed at `now` before counting.
pub fn today_duration<'a, Tz: TimeZone>(
    intervals: impl IntoIterator<Item = &'a TimeInterval>,
    open_interval: Option<&TimeInterval>,
    now: &DateTime<Tz>,
) -> Duration {
    let (day_start, day_end) = day_range(now);
    closed_in_range(intervals, day_start, day_end)
        + open_in_range(open_interval, now.to_utc(), day_start, day_end)
}

fn closed_in_range<'a>(
    intervals: impl IntoIterator<Item = &'a TimeInterval>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Duration {
    let closed = intervals.into_iter().filter(|v| !v.is_open());
    total_duration(&crop_list_to_range(closed, start, end))
}

fn open_in_range(
    open_interval: Option<&TimeInterval>,
    now: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Duration {
    open_interval
        .map(|v| v.clone().closed_at(now.max(v.start)))
        .and_then(|v| crop_to_range(&v, start, end))
        .and_then(|v| v.duration())
        .unwrap_or_else(Duration::zero)
}

fn closed_duration(interval: &TimeInterval) -> Option<Duration> {
    let end = interval.end?;
    let duration = end - interval.start;
    if duration < Duration::zero() {
        report_violation(InvariantViolation::NegativeSpan {
            start: interval.start,
            end,
        });
        return Some(Duration::zero());
    }
    Some(duration)
}

/// A computed value together with the key it was computed for. `valid` is dropped on every
/// mutation of the underlying data.
#[derive(Debug, Clone)]
struct Cached<K, V> {
    key: K,
    value: V,
    valid: bool,
}

impl<K: PartialEq, V: Copy> Cached<K, V> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            valid: false,
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        (self.valid && self.key == *key).then_some(self.value)
    }

    fn set(&mut self, key: K, value: V) -> V {
        self.key = key;
        self.value = value;
        self.valid = true;
        value
    }

    fn invalidate(&mut self) {
        self.valid = false;
    }
}

/// Caches sums over the interval list of a store. Callers pass a closure producing the
/// intervals, so nothing is iterated when the cached value is still valid.
#[derive(Debug, Clone)]
pub struct Aggregator {
    delimiter: &'static str,
    total: Cached<(), Duration>,
    by_label: Cached<String, Duration>,
    today: Cached<DateTime<Utc>, Duration>,
}

impl Aggregator {
    pub fn new(delimiter: &'static str) -> Self {
        Self {
            delimiter,
            total: Cached::new((), Duration::zero()),
            by_label: Cached::new(String::new(), Duration::zero()),
            today: Cached::new(DateTime::<Utc>::UNIX_EPOCH, Duration::zero()),
        }
    }

    pub fn invalidate(&mut self) {
        trace!("Invalidating aggregates");
        self.total.invalidate();
        self.by_label.invalidate();
        self.today.invalidate();
    }

    pub fn total<'a, I>(&mut self, intervals: impl FnOnce() -> I) -> Duration
    where
        I: IntoIterator<Item = &'a TimeInterval>,
    {
        match self.total.get(&()) {
            Some(v) => v,
            None => self.total.set((), total_duration(intervals())),
        }
    }

    pub fn total_by_label<'a, I>(&mut self, label: &str, intervals: impl FnOnce() -> I) -> Duration
    where
        I: IntoIterator<Item = &'a TimeInterval>,
    {
        let key = label.to_owned();
        match self.by_label.get(&key) {
            Some(v) => v,
            None => {
                let value = total_by_label(intervals(), label, self.delimiter);
                self.by_label.set(key, value)
            }
        }
    }

    /// Same as [today_duration]. Only the part coming from `intervals` is cached, keyed by the
    /// start of the day, so crossing midnight recomputes it.
    pub fn today<'a, I, Tz: TimeZone>(
        &mut self,
        intervals: impl FnOnce() -> I,
        open_interval: Option<&TimeInterval>,
        now: &DateTime<Tz>,
    ) -> Duration
    where
        I: IntoIterator<Item = &'a TimeInterval>,
    {
        let (day_start, day_end) = day_range(now);
        let committed = match self.today.get(&day_start) {
            Some(v) => v,
            None => self
                .today
                .set(day_start, closed_in_range(intervals(), day_start, day_end)),
        };
        committed + open_in_range(open_interval, now.to_utc(), day_start, day_end)
    }
}
