use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Utc};
use clap::Parser;
use tracing::info;

use crate::daemon::{
    control::{ControlRequest, ControlResponse},
    storage::{
        entities::TimeInterval, interval_store::IntervalStore, year_storage::YearStorage,
    },
    RECORDS_DIR,
};

use super::control::send_request;

#[derive(Debug, Parser)]
pub struct ClearCommand {
    #[arg(long, help = "Year to clear. Defaults to the current one")]
    year: Option<i32>,
    #[arg(long, help = "Required, clearing can't be undone")]
    yes: bool,
}

#[derive(Debug, Parser)]
pub struct ImportCommand {
    #[arg(help = "JSON file with an array of intervals, as written by `export`")]
    file: PathBuf,
}

/// Runs `request` in the daemon when the daemon is running and tracking `year`. Returns `false`
/// when the edit has to be done on the record files.
async fn edit_through_daemon(dir: &Path, year: i32, request: ControlRequest) -> Result<bool> {
    // The daemon only holds the partition of the current year
    if year != Utc::now().year() {
        return Ok(false);
    }
    match send_request(dir, &request).await? {
        None => Ok(false),
        Some(ControlResponse::Done) => Ok(true),
        Some(other) => bail!("Unexpected answer {other:?}"),
    }
}

pub async fn process_clear_command(
    dir: &Path,
    ClearCommand { year, yes }: ClearCommand,
) -> Result<()> {
    let year = year.unwrap_or_else(|| Utc::now().year());
    if !yes {
        bail!("This removes every interval of {year}. Pass --yes to confirm");
    }

    if !edit_through_daemon(dir, year, ControlRequest::Clear).await? {
        let storage = YearStorage::new(dir.join(RECORDS_DIR))?;
        IntervalStore::open(storage, year).await.clear_all().await?;
    }

    println!("Cleared records of {year}");
    Ok(())
}

/// Replaces the stored history of every year present in the file.
pub async fn process_import_command(
    dir: &Path,
    ImportCommand { file }: ImportCommand,
) -> Result<()> {
    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {file:?}"))?;
    let intervals = serde_json::from_slice::<Vec<TimeInterval>>(&data)
        .with_context(|| format!("{file:?} isn't a list of intervals"))?;
    let years = partition_by_year(intervals)?;
    let count = years.values().map(Vec::len).sum::<usize>();

    for (year, intervals) in years {
        let len = intervals.len();
        let request = ControlRequest::Replace {
            intervals: intervals.clone(),
        };
        if !edit_through_daemon(dir, year, request).await? {
            let storage = YearStorage::new(dir.join(RECORDS_DIR))?;
            IntervalStore::open(storage, year)
                .await
                .replace_all(intervals)
                .await?;
        }
        info!("Imported {len} intervals into {year}");
    }

    println!("Imported {count} intervals");
    Ok(())
}

/// Groups intervals by the UTC year of their start. Only closed intervals with a non negative
/// span are accepted.
fn partition_by_year(intervals: Vec<TimeInterval>) -> Result<BTreeMap<i32, Vec<TimeInterval>>> {
    let mut years = BTreeMap::<i32, Vec<TimeInterval>>::new();
    for (index, interval) in intervals.into_iter().enumerate() {
        match interval.end {
            None => bail!("Interval #{index} starting at {} has no end", interval.start),
            Some(end) if end < interval.start => {
                bail!("Interval #{index} ends before it starts ({} > {end})", interval.start)
            }
            Some(_) => years.entry(interval.start.year()).or_default().push(interval),
        }
    }
    Ok(years)
}
