use std::{cmp::Ordering, collections::BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Delimiter used when several workspace folders are tracked at once. The label of such an
/// interval is `"first; second"`.
pub const WORKSPACE_NAME_DELIMITER: &str = "; ";

/// The struct used for storing tracked time on the disk. An interval without an end is the one
/// currently being tracked. There should be at most one such interval at any point in time.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TimeInterval {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub start: DateTime<Utc>,
    #[serde(
        with = "chrono::serde::ts_milliseconds_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub end: Option<DateTime<Utc>>,
    /// Older logs call this field `workspace`.
    #[serde(alias = "workspace", default)]
    pub workspace_label: String,
    /// One `root/branch` entry per repository that was active during the interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_labels: Option<Vec<String>>,
}

impl TimeInterval {
    pub fn open(
        start: DateTime<Utc>,
        workspace_label: impl Into<String>,
        repository_labels: Option<Vec<String>>,
    ) -> Self {
        Self {
            start,
            end: None,
            workspace_label: workspace_label.into(),
            repository_labels,
        }
    }

    pub fn closed(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        workspace_label: impl Into<String>,
    ) -> Self {
        Self::open(start, workspace_label, None).closed_at(end)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration of a closed interval. Open intervals don't have one until they are closed with
    /// [TimeInterval::closed_at].
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Returns a copy of the interval ending at `end`. Used both to stamp the end of the tracked
    /// interval and to create a synthetic "now" end for open intervals.
    pub fn closed_at(self, end: DateTime<Utc>) -> Self {
        Self {
            end: Some(end),
            ..self
        }
    }

    pub fn with_start(self, start: DateTime<Utc>) -> Self {
        Self { start, ..self }
    }

    pub fn with_repositories(self, repository_labels: Vec<String>) -> Self {
        Self {
            repository_labels: Some(repository_labels),
            ..self
        }
    }

    /// Workspace names encoded in the label, trimmed.
    pub fn workspace_names<'a>(&'a self, delimiter: &'a str) -> impl Iterator<Item = &'a str> {
        self.workspace_label.split(delimiter).map(str::trim)
    }

    pub fn has_workspace(&self, name: &str, delimiter: &str) -> bool {
        self.workspace_names(delimiter).any(|v| v == name)
    }

    /// Repositories are compared as a set. `None` and an empty list mean the same thing.
    pub fn repository_set(&self) -> BTreeSet<&str> {
        self.repository_labels
            .iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn same_labels(&self, other: &TimeInterval) -> bool {
        self.workspace_label == other.workspace_label
            && self.repository_set() == other.repository_set()
    }

    /// Total order over labels that agrees with [TimeInterval::same_labels].
    pub fn label_cmp(&self, other: &TimeInterval) -> Ordering {
        self.workspace_label
            .cmp(&other.workspace_label)
            .then_with(|| self.repository_set().cmp(&other.repository_set()))
    }

    /// Chronological order. Ties are broken by labels and then by the remaining fields, so that
    /// sorting never depends on the order of the input.
    pub fn chronological_cmp(&self, other: &TimeInterval) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.label_cmp(other))
            .then_with(|| self.end.cmp(&other.end))
            .then_with(|| self.repository_labels.cmp(&other.repository_labels))
    }
}
