use chrono::{DateTime, Duration, TimeZone, Utc};
use now::DateTimeNow;

/// This is the standard way of naming a yearly record file in worktally.
pub fn year_to_record_name(year: i32) -> String {
    format!("{year}.json")
}

/// Returns start of the next day.
pub fn next_day_start<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Tz> {
    (date + Duration::days(1)).beginning_of_day()
}

/// Returns `[start of day, start of next day)` for the day `now` falls on, in the timezone of
/// `now`.
pub fn day_range<Tz: TimeZone>(now: &DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = now.beginning_of_day();
    let end = next_day_start(start.clone());
    (start.to_utc(), end.to_utc())
}

const MINUTES_IN_HOUR: i64 = 60;
const MINUTES_IN_DAY: i64 = 24 * MINUTES_IN_HOUR;
const MINUTES_IN_WEEK: i64 = 7 * MINUTES_IN_DAY;

/// Formats duration as `1w 2d 3h 4m`. Leading units that are zero are skipped, minutes are always
/// shown.
pub fn format_duration(v: Duration) -> String {
    let total = v.num_minutes().max(0);
    let units = [
        (total / MINUTES_IN_WEEK, 'w'),
        (total % MINUTES_IN_WEEK / MINUTES_IN_DAY, 'd'),
        (total % MINUTES_IN_DAY / MINUTES_IN_HOUR, 'h'),
    ];

    let mut parts = units
        .into_iter()
        .skip_while(|(value, _)| *value == 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect::<Vec<_>>();
    parts.push(format!("{}m", total % MINUTES_IN_HOUR));
    parts.join(" ")
}
