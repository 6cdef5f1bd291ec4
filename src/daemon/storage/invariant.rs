//! Broken invariants indicate a bug upstream of the interval engine. Debug builds fail loudly,
//! release builds log the violation and let the caller clamp the value, so that a long running
//! daemon doesn't go down because of a single bad record.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::error;

use super::entities::TimeInterval;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("interval ends before it starts ({start} > {end})")]
    NegativeSpan {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("attempted to merge across an open interval starting at {start}")]
    MergeAcrossOpen { start: DateTime<Utc> },
    #[error("attempted to crop an open interval starting at {start}")]
    CropOfOpen { start: DateTime<Utc> },
    #[error("found {count} open intervals, at most one is allowed")]
    MultipleOpenIntervals { count: usize },
}

#[track_caller]
pub fn report_violation(violation: InvariantViolation) {
    error!("Invariant violation: {violation}");
    debug_assert!(false, "invariant violation: {violation}");
}

/// Checks that at most one interval is open.
pub fn check_single_open<'a>(intervals: impl IntoIterator<Item = &'a TimeInterval>) {
    let count = intervals.into_iter().filter(|v| v.is_open()).count();
    if count > 1 {
        report_violation(InvariantViolation::MultipleOpenIntervals { count });
    }
}
