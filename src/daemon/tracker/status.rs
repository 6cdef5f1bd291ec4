use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::DisplaySettings,
    daemon::storage::entities::TimeInterval,
    fs::operations::atomic_write,
    utils::time::format_duration,
};

pub const STATUS_FILE_NAME: &str = "status.json";

const TRACKING_ICON: &str = "▶";
const STOPPED_ICON: &str = "■";
const SEPARATOR: &str = " | ";

/// Aggregated durations at a point in time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub total_ms: i64,
    /// Time attributed to the primary workspace.
    pub workspace_ms: i64,
    pub today_ms: i64,
    /// Time tracked since the daemon started.
    pub session_ms: i64,
    pub is_tracking: bool,
}

/// What the daemon publishes for the CLI after every tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub snapshot: Snapshot,
    pub status_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<TimeInterval>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

pub fn status_path(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE_NAME)
}

/// Renders `▶ 1h 5m | 30m` style line. Durations are listed in the order total, workspace,
/// today, session and only when enabled.
pub fn render_status_line(snapshot: &Snapshot, display: &DisplaySettings) -> String {
    let icon = if snapshot.is_tracking {
        TRACKING_ICON
    } else {
        STOPPED_ICON
    };

    let texts = [
        (display.show_total_time, snapshot.total_ms),
        (display.show_total_workspace_time, snapshot.workspace_ms),
        (display.show_today_time, snapshot.today_ms),
        (display.show_from_start_time, snapshot.session_ms),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .map(|(_, ms)| format_duration(Duration::milliseconds(ms)))
    .collect::<Vec<_>>();

    format!("{icon} {}", texts.join(SEPARATOR))
}

pub async fn write_status(path: &Path, report: &StatusReport) -> Result<()> {
    let data = serde_json::to_vec_pretty(report)?;
    atomic_write(path, &data)
        .await
        .with_context(|| format!("Failed to write status to {path:?}"))
}

/// Returns `None` if the daemon never wrote a status.
pub async fn read_status(path: &Path) -> Result<Option<StatusReport>> {
    let data = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
    };
    let report = serde_json::from_slice(&data)
        .with_context(|| format!("Status file {path:?} is malformed"))?;
    Ok(Some(report))
}
