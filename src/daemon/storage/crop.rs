use chrono::{DateTime, Utc};

use super::{
    entities::TimeInterval,
    invariant::{report_violation, InvariantViolation},
};

/// Returns the part of `interval` that lies inside `[range_start, range_end)`. Since the interval
/// might lie outside of the range completely the result is optional.
///
/// Open intervals have to be closed with a synthetic end (usually "now") before cropping, this
/// function never reads the clock.
pub fn crop_to_range(
    interval: &TimeInterval,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Option<TimeInterval> {
    let Some(end) = interval.end else {
        report_violation(InvariantViolation::CropOfOpen {
            start: interval.start,
        });
        return None;
    };
    if end < interval.start {
        report_violation(InvariantViolation::NegativeSpan {
            start: interval.start,
            end,
        });
        return None;
    }

    let start = interval.start.max(range_start);
    let end = end.min(range_end);
    if start >= end {
        return None;
    }

    Some(TimeInterval {
        start,
        end: Some(end),
        ..interval.clone()
    })
}

/// Crops every interval to the range, dropping the ones that end up empty. Order of surviving
/// intervals is preserved.
pub fn crop_list_to_range<'a>(
    intervals: impl IntoIterator<Item = &'a TimeInterval>,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Vec<TimeInterval> {
    intervals
        .into_iter()
        .filter_map(|v| crop_to_range(v, range_start, range_end))
        .collect()
}
