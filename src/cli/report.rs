use std::{fmt::Display, path::Path};

use ansi_term::{Colour, Style};
use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Local, Utc};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use futures::StreamExt;
use now::DateTimeNow;

use crate::{
    config::ConfigSource,
    daemon::{
        boundary::probe::NO_WORKSPACE_LABEL,
        storage::{
            aggregate::{today_duration, total_by_label, total_duration},
            crop::crop_to_range,
            entities::{TimeInterval, WORKSPACE_NAME_DELIMITER},
            year_storage::{PersistenceGateway, YearStorage},
        },
        tracker::status::{read_status, render_status_line, status_path, Snapshot, StatusReport},
        RECORDS_DIR,
    },
    utils::time::{format_duration, next_day_start},
};

use super::{
    output::{
        analysis::{analyze_days, GroupBy},
        extract_between, ExtractConfig,
    },
    control::live_partition,
    process::{daemon_executable, is_daemon_running},
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

const DATE_EXAMPLES: &str =
    "Examples are \"yesterday\", \"1 week ago\", \"15/03/2025\", \"12:00 16/03/2025\"";

#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    #[arg(long = "start", short, help = format!("Start of the range. {DATE_EXAMPLES}"))]
    start_date: Option<String>,
    #[arg(long = "end", short, help = format!("End of the range. {DATE_EXAMPLES}"))]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "exact",
        default_value_t = false,
        help = "Use the dates as they are instead of extending them to whole days"
    )]
    exact: bool,
}

#[derive(Debug, Parser)]
pub struct LogCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, short, value_enum, default_value_t = GroupBy::Workspace)]
    group_by: GroupBy,
}

#[derive(Debug, Parser)]
pub struct ExportCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(
        long,
        help = "Export every stored interval, ignoring the range",
        conflicts_with_all = ["start_date", "end_date"]
    )]
    all: bool,
    #[arg(long, help = "Leave out the interval that is being tracked right now")]
    skip_current: bool,
}

const DEFAULT_LOG_DAYS: i64 = 7;

struct DateRange {
    start: DateTime<Local>,
    end: DateTime<Local>,
}

/// Parses the range arguments. By default the range covers the last week, today included.
fn parse_range(range: RangeArgs, now: DateTime<Local>) -> Result<DateRange> {
    let dialect: chrono_english::Dialect = range.date_style.into();
    let parse = |value: Option<String>, name: &str| -> Result<Option<DateTime<Local>>> {
        match value.map(|s| parse_date_string(&s, now, dialect)) {
            Some(Ok(v)) => Ok(Some(v.with_timezone(&Local))),
            Some(Err(e)) => Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate {name} date {e}"),
                )
                .into()),
            None => Ok(None),
        }
    };

    let mut start = parse(range.start_date, "start")?
        .unwrap_or_else(|| now - Duration::days(DEFAULT_LOG_DAYS - 1));
    let mut end = parse(range.end_date, "end")?.unwrap_or(now);
    if !range.exact {
        start = start.beginning_of_day();
        end = next_day_start(end);
    }
    if end < start {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "End of the range is before its start",
            )
            .into());
    }
    Ok(DateRange { start, end })
}

type UtcRange = (DateTime<Utc>, DateTime<Utc>);

/// Intervals of `range`, or of every stored year without one. The year the daemon tracks is
/// asked from the daemon, so intervals it hasn't saved yet are included. Open intervals are
/// returned as they are.
async fn collect_intervals(dir: &Path, range: Option<UtcRange>) -> Result<Vec<TimeInterval>> {
    let storage = YearStorage::new(dir.join(RECORDS_DIR))?;
    let live = live_partition(dir).await?;
    let exclude_year = live.as_ref().map(|(year, _)| *year);

    let mut intervals = match range {
        Some((start, end)) => {
            extract_between(
                storage,
                ExtractConfig {
                    start,
                    end,
                    exclude_year,
                },
            )
            .collect::<Vec<_>>()
            .await
        }
        None => {
            let mut intervals = vec![];
            for year in storage.stored_years()? {
                if Some(year) != exclude_year {
                    intervals.extend(storage.load(year).await);
                }
            }
            intervals
        }
    };
    if let Some((_, live)) = live {
        add_live(&mut intervals, live, range);
    }
    Ok(intervals)
}

/// Closed intervals are cropped to `range`, open ones are kept whole if they start before its end.
fn add_live(intervals: &mut Vec<TimeInterval>, live: Vec<TimeInterval>, range: Option<UtcRange>) {
    for interval in live {
        match range {
            Some((start, end)) if !interval.is_open() => {
                intervals.extend(crop_to_range(&interval, start, end))
            }
            Some((_, end)) if interval.start >= end => {}
            _ => intervals.push(interval),
        }
    }
}

/// Prints tracked time per day.
pub async fn process_log_command(
    dir: &Path,
    LogCommand { range, group_by }: LogCommand,
) -> Result<()> {
    let now = Local::now();
    let DateRange { start, end } = parse_range(range, now)?;
    let (start, end) = (start.to_utc(), end.to_utc());

    let intervals = collect_intervals(dir, Some((start, end)))
        .await?
        .into_iter()
        .filter_map(|v| match v.end {
            Some(_) => Some(v),
            // The running interval counts until now
            None if v.start < now.to_utc() => {
                crop_to_range(&v.closed_at(now.to_utc()), start, end)
            }
            None => None,
        })
        .collect::<Vec<_>>();

    let days = analyze_days(&intervals, group_by, &Local);
    if days.is_empty() {
        println!(
            "Nothing was tracked between {} and {}",
            start.with_timezone(&Local).format("%x"),
            end.with_timezone(&Local).format("%x")
        );
        return Ok(());
    }

    let header = Style::new().bold();
    let mut total = Duration::zero();
    for day in days {
        total += day.total;
        println!(
            "{}\t{}",
            header.paint(day.day.format("%a %x").to_string()),
            header.paint(format_duration(day.total))
        );
        for usage in day.usages {
            println!("  {}\t{}", format_duration(usage.duration), usage.name);
        }
        println!();
    }
    println!("Total\t{}", header.paint(format_duration(total)));
    Ok(())
}

/// Writes intervals as a JSON array to stdout, in the format of the record files. The running
/// interval is exported open.
pub async fn process_export_command(
    dir: &Path,
    ExportCommand {
        range,
        all,
        skip_current,
    }: ExportCommand,
) -> Result<()> {
    let range = if all {
        None
    } else {
        let DateRange { start, end } = parse_range(range, Local::now())?;
        Some((start.to_utc(), end.to_utc()))
    };

    let mut intervals = collect_intervals(dir, range).await?;
    if skip_current {
        intervals.retain(|v| !v.is_open());
    }
    intervals.sort_by(TimeInterval::chronological_cmp);

    println!("{}", serde_json::to_string_pretty(&intervals)?);
    Ok(())
}

/// Prints the status published by the daemon. When the daemon isn't running the numbers are
/// computed from the record files.
pub async fn process_status_command(dir: &Path, json: bool) -> Result<()> {
    let running = is_daemon_running(&daemon_executable()?)?;
    let report = match read_status(&status_path(dir)).await? {
        Some(report) if running => report,
        _ => offline_report(dir).await?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let colour = if report.snapshot.is_tracking {
        Colour::Green
    } else {
        Colour::Yellow
    };
    println!("{}", colour.bold().paint(&report.status_line));
    let snapshot = report.snapshot;
    let print_line = |name: &str, ms: i64| {
        println!("  {name:<10} {}", format_duration(Duration::milliseconds(ms)));
    };
    print_line("Total", snapshot.total_ms);
    print_line("Workspace", snapshot.workspace_ms);
    print_line("Today", snapshot.today_ms);
    if running {
        print_line("Session", snapshot.session_ms);
    }
    match &report.current {
        Some(current) => println!(
            "  {:<10} {} since {}",
            "Tracking",
            current.workspace_label,
            current.start.with_timezone(&Local).format("%X")
        ),
        None if running => println!("  Tracking is paused"),
        None => println!("  {}", Style::new().dimmed().paint("Daemon is not running")),
    }
    Ok(())
}

/// Computes the status of a stopped tracker for the current year.
async fn offline_report(dir: &Path) -> Result<StatusReport> {
    let now = Local::now();
    let storage = YearStorage::new(dir.join(RECORDS_DIR))?;
    let intervals = storage.load(now.to_utc().year()).await;

    let config = ConfigSource::in_dir(dir).load()?;
    let workspace = config
        .workspaces
        .first()
        .and_then(|v| v.file_name())
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| NO_WORKSPACE_LABEL.to_owned());

    let snapshot = Snapshot {
        total_ms: total_duration(&intervals).num_milliseconds(),
        workspace_ms: total_by_label(&intervals, &workspace, WORKSPACE_NAME_DELIMITER)
            .num_milliseconds(),
        today_ms: today_duration(&intervals, None, &now).num_milliseconds(),
        session_ms: 0,
        is_tracking: false,
    };
    Ok(StatusReport {
        status_line: render_status_line(&snapshot, &config.display_settings()),
        snapshot,
        current: None,
        updated_at: now.to_utc(),
    })
}
