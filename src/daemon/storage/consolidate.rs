use tracing::trace;

use super::{
    entities::TimeInterval,
    invariant::{report_violation, InvariantViolation},
};

/// Creates the minimal sequence of intervals covering the same time. Overlapping or touching
/// intervals with the same labels are merged into one. Result is sorted by start.
///
/// Intervals are grouped by labels first, so an interval of another workspace lying in between
/// doesn't prevent two intervals of the same workspace from collapsing. Open intervals are kept
/// as they are and are never merged with anything.
pub fn consolidate(intervals: impl IntoIterator<Item = TimeInterval>) -> Vec<TimeInterval> {
    let mut sorted = intervals.into_iter().collect::<Vec<_>>();
    sorted.sort_by(|a, b| {
        a.label_cmp(b)
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| a.end.cmp(&b.end))
            .then_with(|| a.repository_labels.cmp(&b.repository_labels))
    });

    let mut collapsed = Vec::with_capacity(sorted.len());
    let mut accumulator: Option<TimeInterval> = None;

    for interval in sorted {
        if interval.is_open() {
            collapsed.extend(accumulator.take());
            collapsed.push(interval);
            continue;
        }

        match accumulator.as_mut() {
            Some(current) if current.same_labels(&interval) && touches(current, &interval) => {
                extend(current, &interval);
            }
            Some(_) | None => {
                collapsed.extend(accumulator.replace(interval));
            }
        }
    }
    collapsed.extend(accumulator);

    collapsed.sort_by(TimeInterval::chronological_cmp);
    trace!("Consolidated into {} intervals", collapsed.len());
    collapsed
}

fn touches(current: &TimeInterval, next: &TimeInterval) -> bool {
    matches!(current.end, Some(end) if next.start <= end)
}

fn extend(current: &mut TimeInterval, next: &TimeInterval) {
    match (current.end, next.end) {
        (Some(end), Some(next_end)) => current.end = Some(end.max(next_end)),
        _ => report_violation(InvariantViolation::MergeAcrossOpen {
            start: current.start,
        }),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::daemon::storage::{aggregate::total_duration, entities::TimeInterval};

    use super::consolidate;

    fn ms(value: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(value).unwrap()
    }

    fn interval(start: i64, end: i64, label: &str) -> TimeInterval {
        TimeInterval::closed(ms(start), ms(end), label)
    }

    fn mixed_input() -> Vec<TimeInterval> {
        vec![
            interval(300, 400, "A"),
            interval(0, 100, "A"),
            interval(50, 150, "A"),
            interval(10, 20, "B"),
            interval(150, 200, "A"),
            interval(100, 250, "B"),
            interval(120, 130, "A").with_repositories(vec!["repo/main".into()]),
            interval(125, 140, "A").with_repositories(vec!["repo/main".into()]),
            TimeInterval::open(ms(390), "A", None),
        ]
    }

    #[test]
    fn test_overlapping_same_label_merges() {
        let values = consolidate(vec![interval(0, 100, "A"), interval(50, 150, "A")]);
        assert_eq!(values, vec![interval(0, 150, "A")]);
    }

    #[test]
    fn test_touching_different_labels_stay_apart() {
        let input = vec![interval(0, 100, "A"), interval(100, 200, "B")];
        assert_eq!(consolidate(input.clone()), input);
    }

    #[test]
    fn test_touching_same_label_merges() {
        let values = consolidate(vec![interval(100, 200, "A"), interval(0, 100, "A")]);
        assert_eq!(values, vec![interval(0, 200, "A")]);
    }

    #[test]
    fn test_contained_interval_is_absorbed() {
        let values = consolidate(vec![interval(0, 100, "A"), interval(20, 30, "A")]);
        assert_eq!(values, vec![interval(0, 100, "A")]);
    }

    #[test]
    fn test_other_label_in_between_does_not_block_merge() {
        let values = consolidate(vec![
            interval(0, 100, "A"),
            interval(10, 20, "B"),
            interval(50, 150, "A"),
        ]);
        assert_eq!(values, vec![interval(0, 150, "A"), interval(10, 20, "B")]);
    }

    #[test]
    fn test_repository_labels_separate_intervals() {
        let values = consolidate(vec![
            interval(0, 100, "A").with_repositories(vec!["a/main".into()]),
            interval(50, 150, "A").with_repositories(vec!["a/feature".into()]),
        ]);
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn test_open_interval_is_never_merged() {
        let open = TimeInterval::open(ms(50), "A", None);
        let values = consolidate(vec![
            interval(0, 100, "A"),
            open.clone(),
            interval(60, 70, "A"),
        ]);
        // The sweep restarts after the open interval, so the later interval survives on its own
        assert_eq!(values, vec![interval(0, 100, "A"), open, interval(60, 70, "A")]);
    }

    #[test]
    fn test_open_interval_splits_the_sweep() {
        let open = TimeInterval::open(ms(0), "A", None);
        let values = consolidate(vec![
            open.clone(),
            interval(10, 20, "A"),
            interval(20, 30, "A"),
        ]);
        assert_eq!(values, vec![open, interval(10, 30, "A")]);
    }

    #[test]
    fn test_consolidation_is_idempotent() {
        let once = consolidate(mixed_input());
        let twice = consolidate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_consolidation_ignores_input_order() {
        let expected = consolidate(mixed_input());

        let mut reversed = mixed_input();
        reversed.reverse();
        assert_eq!(consolidate(reversed), expected);

        let mut rotated = mixed_input();
        rotated.rotate_left(4);
        assert_eq!(consolidate(rotated), expected);
    }

    #[test]
    fn test_consolidated_output_is_sorted_and_disjoint_per_label() {
        let values = consolidate(mixed_input());
        for pair in values.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
        for (i, a) in values.iter().enumerate() {
            for b in values.iter().skip(i + 1) {
                if a.same_labels(b) && !a.is_open() && !b.is_open() {
                    assert!(a.end.unwrap() < b.start || b.end.unwrap() < a.start, "{a:?} {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_consolidated_total_never_exceeds_naive_sum() {
        let input = mixed_input();
        let naive = total_duration(&input);
        let consolidated = total_duration(&consolidate(input));
        assert!(consolidated <= naive);

        let disjoint = vec![
            interval(0, 10, "A"),
            interval(20, 30, "A"),
            interval(5, 25, "B"),
        ];
        assert_eq!(total_duration(&consolidate(disjoint.clone())), total_duration(&disjoint));
        assert_eq!(total_duration(&disjoint), Duration::milliseconds(40));
    }

    #[test]
    fn test_empty_input() {
        assert!(consolidate(Vec::new()).is_empty());
    }
}
