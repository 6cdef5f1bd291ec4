//! Configuration loading. Values come from defaults, then `config.toml` in the application
//! directory, then `WORKTALLY_*` environment variables.

use std::{
    path::{Path, PathBuf},
    time::Duration as StdDuration,
};

use chrono::Duration;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// How often the tracked interval is split and written to the disk while tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveInterval {
    /// Only on stop and on exit
    #[serde(rename = "never")]
    Never,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
}

impl SaveInterval {
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            SaveInterval::Never => None,
            SaveInterval::FiveMinutes => Some(Duration::minutes(5)),
            SaveInterval::TenMinutes => Some(Duration::minutes(10)),
            SaveInterval::FifteenMinutes => Some(Duration::minutes(15)),
            SaveInterval::ThirtyMinutes => Some(Duration::minutes(30)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directories whose names make up the workspace label.
    pub workspaces: Vec<PathBuf>,
    /// Attribute time to the checked out branch of every workspace that is a git repository.
    pub track_git_branch: bool,
    pub save_interval: SaveInterval,
    /// Consolidate the log on every save instead of only on exit.
    pub compact_on_save: bool,
    pub show_total_time: bool,
    pub show_total_workspace_time: bool,
    pub show_today_time: bool,
    pub show_from_start_time: bool,
    /// Seconds between checks for workspace and branch changes.
    pub poll_interval_secs: u64,
    /// Seconds between periodic saves checks and status updates.
    pub tick_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspaces: vec![],
            track_git_branch: true,
            save_interval: SaveInterval::FiveMinutes,
            compact_on_save: false,
            show_total_time: true,
            show_total_workspace_time: true,
            show_today_time: true,
            show_from_start_time: false,
            poll_interval_secs: 5,
            tick_interval_secs: 60,
        }
    }
}

/// Settings that affect how the tracker records and saves intervals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerSettings {
    pub save_interval: Option<Duration>,
    pub compact_on_save: bool,
}

/// Which durations end up in the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySettings {
    pub show_total_time: bool,
    pub show_total_workspace_time: bool,
    pub show_today_time: bool,
    pub show_from_start_time: bool,
}

impl Config {
    pub fn tracker_settings(&self) -> TrackerSettings {
        TrackerSettings {
            save_interval: self.save_interval.as_duration(),
            compact_on_save: self.compact_on_save,
        }
    }

    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            show_total_time: self.show_total_time,
            show_total_workspace_time: self.show_total_workspace_time,
            show_today_time: self.show_today_time,
            show_from_start_time: self.show_from_start_time,
        }
    }

    pub fn poll_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn tick_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.tick_interval_secs.max(1))
    }
}

/// Location of the configuration file. The file is re-read on every poll of the daemon, so edits
/// take effect without a restart.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    path: PathBuf,
}

impl ConfigSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONFIG_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Config, figment::Error> {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(&self.path))
            .merge(Env::prefixed("WORKTALLY_"))
            .extract()
    }
}
