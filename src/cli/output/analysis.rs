use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use clap::ValueEnum;
use now::DateTimeNow;

use crate::{
    daemon::storage::{
        crop::crop_to_range,
        entities::{TimeInterval, WORKSPACE_NAME_DELIMITER},
    },
    utils::time::next_day_start,
};

/// What time is attributed to in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    /// Every workspace name of a label gets the full duration
    Workspace,
    /// Every `root/branch` entry gets the full duration
    Repository,
    /// The label as it was recorded
    Label,
}

#[derive(Debug, PartialEq, Eq)]
pub struct Usage {
    pub name: String,
    pub duration: Duration,
}

#[derive(Debug, PartialEq, Eq)]
pub struct DayUsage {
    pub day: NaiveDate,
    /// Wall time tracked during the day, without double counting.
    pub total: Duration,
    pub usages: Vec<Usage>,
}

const NO_REPOSITORY: &str = "(no repository)";

/// Splits intervals at midnight of `timezone` and groups them by day. Days without any tracked
/// time are left out. Usages are sorted by duration, longest first.
pub fn analyze_days<Tz: TimeZone>(
    intervals: &[TimeInterval],
    group_by: GroupBy,
    timezone: &Tz,
) -> Vec<DayUsage> {
    let mut days = BTreeMap::<NaiveDate, Vec<TimeInterval>>::new();

    for interval in intervals {
        let Some(end) = interval.end else {
            continue;
        };
        let mut day_start = interval.start.with_timezone(timezone).beginning_of_day();
        while day_start.to_utc() < end {
            let day_end = next_day_start(day_start.clone());
            if let Some(cropped) = crop_to_range(interval, day_start.to_utc(), day_end.to_utc()) {
                days.entry(day_start.date_naive()).or_default().push(cropped);
            }
            day_start = day_end;
        }
    }

    days.into_iter()
        .map(|(day, intervals)| DayUsage {
            day,
            total: covered_duration(&intervals),
            usages: analyze_usage(&intervals, group_by),
        })
        .collect()
}

/// Sums durations per group. An interval with several workspaces or repositories counts fully
/// towards each of them.
pub fn analyze_usage(intervals: &[TimeInterval], group_by: GroupBy) -> Vec<Usage> {
    let mut map = BTreeMap::<String, Duration>::new();

    for interval in intervals {
        let Some(duration) = interval.duration() else {
            continue;
        };
        let names: Vec<String> = match group_by {
            GroupBy::Workspace => interval
                .workspace_names(WORKSPACE_NAME_DELIMITER)
                .map(str::to_owned)
                .collect(),
            GroupBy::Repository => {
                let repositories = interval.repository_set();
                if repositories.is_empty() {
                    vec![NO_REPOSITORY.to_owned()]
                } else {
                    repositories.into_iter().map(str::to_owned).collect()
                }
            }
            GroupBy::Label => vec![interval.workspace_label.clone()],
        };
        for name in names {
            *map.entry(name).or_insert_with(Duration::zero) += duration;
        }
    }

    let mut usages = map
        .into_iter()
        .map(|(name, duration)| Usage { name, duration })
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.name.cmp(&b.name)));
    usages
}

/// Time covered by at least one interval.
pub fn covered_duration(intervals: &[TimeInterval]) -> Duration {
    let mut spans = intervals
        .iter()
        .filter_map(|v| Some((v.start, v.end?)))
        .collect::<Vec<(DateTime<Utc>, DateTime<Utc>)>>();
    spans.sort();

    let mut total = Duration::zero();
    let mut covered_until: Option<DateTime<Utc>> = None;
    for (start, end) in spans {
        let start = covered_until.map_or(start, |v| v.max(start));
        if end > start {
            total += end - start;
            covered_until = Some(end);
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use crate::daemon::storage::entities::TimeInterval;

    use super::{analyze_days, analyze_usage, covered_duration, GroupBy, Usage};

    fn at(day: u32, hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_shared_label_counts_for_every_workspace() {
        let intervals = vec![
            TimeInterval::closed(at(1, 9), at(1, 10), "Alpha; Beta"),
            TimeInterval::closed(at(1, 11), at(1, 13), "Beta"),
        ];

        assert_eq!(
            analyze_usage(&intervals, GroupBy::Workspace),
            vec![
                Usage {
                    name: "Beta".into(),
                    duration: Duration::hours(3)
                },
                Usage {
                    name: "Alpha".into(),
                    duration: Duration::hours(1)
                },
            ]
        );
    }

    #[test]
    fn test_repository_grouping() {
        let intervals = vec![
            TimeInterval::closed(at(1, 9), at(1, 10), "a")
                .with_repositories(vec!["a/main".into(), "b/dev".into()]),
            TimeInterval::closed(at(1, 10), at(1, 11), "a"),
        ];

        let usages = analyze_usage(&intervals, GroupBy::Repository);
        assert_eq!(usages.len(), 3);
        assert!(usages.iter().all(|v| v.duration == Duration::hours(1)));
    }

    #[test]
    fn test_days_are_split_at_midnight() {
        let intervals = vec![TimeInterval::closed(at(1, 23), at(2, 1), "night")];

        let days = analyze_days(&intervals, GroupBy::Label, &Utc);

        assert_eq!(days.len(), 2);
        assert_eq!(days[0].day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(days[0].total, Duration::hours(1));
        assert_eq!(days[1].day, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(days[1].usages[0].duration, Duration::hours(1));
    }

    #[test]
    fn test_covered_duration_ignores_overlaps() {
        let intervals = vec![
            TimeInterval::closed(at(1, 9), at(1, 11), "a"),
            TimeInterval::closed(at(1, 10), at(1, 12), "b"),
            TimeInterval::closed(at(1, 14), at(1, 15), "a"),
        ];
        assert_eq!(covered_duration(&intervals), Duration::hours(4));
    }
}
