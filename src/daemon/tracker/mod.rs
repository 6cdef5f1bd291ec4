//! The tracking state machine. The tracker holds the single open interval of the system and decides
//! when closed intervals are handed to the [IntervalStore] and when the store is flushed.

use chrono::{DateTime, Datelike, Duration, Local, TimeZone, Utc};
use tracing::{debug, info, instrument, warn};

use crate::{
    config::TrackerSettings,
    daemon::{
        boundary::probe::{Boundary, WorkspaceIdentity, NO_WORKSPACE_LABEL},
        storage::{
            aggregate::today_duration,
            entities::{TimeInterval, WORKSPACE_NAME_DELIMITER},
            error::StorageError,
            interval_store::IntervalStore,
            year_storage::PersistenceGateway,
        },
    },
    utils::{clock::Clock, time::day_range},
};

use status::Snapshot;

pub mod status;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingState {
    Tracking { current: TimeInterval },
    Stopped,
}

pub struct Tracker<G: PersistenceGateway, Tz: TimeZone = Local> {
    store: IntervalStore<G>,
    state: TrackingState,
    boundary: Boundary,
    settings: TrackerSettings,
    /// Time of the intervals this process opened and already closed.
    session: Duration,
    /// Intervals of the previous partition that belong to the current local day. The partition
    /// changes at the UTC new year, while the day ends at local midnight.
    carried_over: Vec<TimeInterval>,
    clock: Box<dyn Clock>,
    /// Timezone the "today" window is computed in.
    timezone: Tz,
}

impl<G: PersistenceGateway, Tz: TimeZone> Tracker<G, Tz> {
    /// Opens the partition of the current year and starts tracking right away.
    pub async fn start_tracking(
        gateway: G,
        boundary: Boundary,
        settings: TrackerSettings,
        clock: Box<dyn Clock>,
        timezone: Tz,
    ) -> Self {
        let now = clock.time();
        let store = IntervalStore::open(gateway, now.year()).await;

        let (day_start, _) = day_range(&now.with_timezone(&timezone));
        let carried_over = if day_start.year() < now.year() {
            let previous = store.gateway().load(now.year() - 1).await;
            ending_after(previous, day_start)
        } else {
            vec![]
        };

        let current = open_interval(now, &boundary.identity);
        info!("Started tracking {}", current.workspace_label);
        Self {
            store,
            state: TrackingState::Tracking { current },
            boundary,
            settings,
            session: Duration::zero(),
            carried_over,
            clock,
            timezone,
        }
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn current(&self) -> Option<&TimeInterval> {
        match &self.state {
            TrackingState::Tracking { current } => Some(current),
            TrackingState::Stopped => None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.current().is_some()
    }

    pub fn identity(&self) -> &WorkspaceIdentity {
        &self.boundary.identity
    }

    pub fn store(&self) -> &IntervalStore<G> {
        &self.store
    }

    pub fn set_settings(&mut self, settings: TrackerSettings) {
        debug!("Updated tracker settings {settings:?}");
        self.settings = settings;
    }

    /// Opens a new interval. Returns `false` if the tracker was already tracking.
    pub fn start(&mut self) -> bool {
        if self.is_tracking() {
            return false;
        }
        let current = open_interval(self.clock.time(), self.identity());
        info!("Started tracking {}", current.workspace_label);
        self.state = TrackingState::Tracking { current };
        true
    }

    /// Closes the current interval and flushes the store. The tracker is stopped even when the
    /// flush fails, the closed interval then stays pending.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), StorageError> {
        if !self.is_tracking() {
            return Ok(());
        }
        self.close_current(self.clock.time());
        info!("Stopped tracking");
        self.store.flush(self.settings.compact_on_save).await
    }

    pub async fn toggle(&mut self) -> Result<(), StorageError> {
        if self.is_tracking() {
            self.stop().await
        } else {
            self.start();
            Ok(())
        }
    }

    /// Attributes further time to the identity of `boundary`. While tracking, the current interval
    /// is closed and a new one is opened at the same instant. Flipping branch tracking is a
    /// crossing even when the identity stays the same.
    pub fn boundary_crossed(&mut self, boundary: Boundary) {
        if boundary == self.boundary {
            return;
        }
        self.boundary = boundary;
        if self.is_tracking() {
            let now = self.clock.time();
            self.close_current(now);
            let current = open_interval(now, self.identity());
            info!("Switched tracking to {}", current.workspace_label);
            self.state = TrackingState::Tracking { current };
        }
    }

    /// Splits the current interval at the present moment and flushes the store.
    pub async fn save(&mut self) -> Result<(), StorageError> {
        let now = self.clock.time();
        self.split_at(now);
        self.store.flush(self.settings.compact_on_save).await
    }

    /// Periodic housekeeping: moves the store to the partition of a new year and saves when the
    /// current interval is older than the configured save interval.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) -> Result<(), StorageError> {
        let now = self.clock.time();
        let (day_start, _) = day_range(&now.with_timezone(&self.timezone));

        if now.year() != self.store.year() {
            info!("Year changed to {}", now.year());
            self.split_at(now);
            let previous = self.store.get_all();
            self.store
                .reopen(now.year(), self.settings.compact_on_save)
                .await?;
            self.carried_over = ending_after(previous, day_start);
        } else if !self.carried_over.is_empty() {
            self.carried_over = ending_after(std::mem::take(&mut self.carried_over), day_start);
        }

        let due = match (self.current(), self.settings.save_interval) {
            (Some(current), Some(interval)) => now - current.start > interval,
            _ => false,
        };
        if due {
            debug!("Save interval elapsed");
            self.save().await?;
        }
        Ok(())
    }

    /// Closes the current interval and writes everything, consolidated, to the disk.
    #[instrument(skip(self))]
    pub async fn shutdown(&mut self) -> Result<(), StorageError> {
        if self.is_tracking() {
            self.close_current(self.clock.time());
        }
        self.store.flush(true).await
    }

    /// Removes every interval of the partition. A running interval is discarded and tracking
    /// resumes with a fresh one. Nothing changes when the partition can't be written.
    pub async fn clear_all(&mut self) -> Result<(), StorageError> {
        self.store.clear_all().await?;
        self.session = Duration::zero();
        let now = self.clock.time();
        if let TrackingState::Tracking { current } = &mut self.state {
            *current = open_interval(now, &self.boundary.identity);
        }
        info!("Cleared tracked time");
        Ok(())
    }

    /// Overwrites the history of the partition. Open intervals are dropped, the tracker's own
    /// interval is the only one allowed to be open.
    pub async fn replace_all(&mut self, intervals: Vec<TimeInterval>) -> Result<(), StorageError> {
        let (open, closed): (Vec<_>, Vec<_>) = intervals.into_iter().partition(|v| v.is_open());
        if !open.is_empty() {
            warn!("Dropping {} open intervals from the replacement", open.len());
        }
        self.store.replace_all(closed).await
    }

    /// Every interval of the partition including the current one, in chronological order.
    pub fn exportable_intervals(&self) -> Vec<TimeInterval> {
        let mut intervals = self.store.get_all();
        intervals.extend(self.current().cloned());
        intervals.sort_by(TimeInterval::chronological_cmp);
        intervals
    }

    pub fn snapshot(&mut self) -> Snapshot {
        let now = self.clock.time();
        let local_now = now.with_timezone(&self.timezone);
        let current = self.current().cloned();
        let elapsed = current
            .as_ref()
            .map(|v| (now - v.start).max(Duration::zero()))
            .unwrap_or_else(Duration::zero);

        let workspace = self
            .identity()
            .primary_workspace()
            .unwrap_or(NO_WORKSPACE_LABEL)
            .to_owned();
        let mut workspace_total = self.store.total_by_label(&workspace);
        if current
            .as_ref()
            .is_some_and(|v| v.has_workspace(&workspace, WORKSPACE_NAME_DELIMITER))
        {
            workspace_total += elapsed;
        }

        Snapshot {
            total_ms: (self.store.total_duration() + elapsed).num_milliseconds(),
            workspace_ms: workspace_total.num_milliseconds(),
            today_ms: (self.store.today_duration(current.as_ref(), &local_now)
                + today_duration(&self.carried_over, None, &local_now))
            .num_milliseconds(),
            session_ms: (self.session + elapsed).num_milliseconds(),
            is_tracking: current.is_some(),
        }
    }

    fn close_current(&mut self, now: DateTime<Utc>) {
        let TrackingState::Tracking { current } =
            std::mem::replace(&mut self.state, TrackingState::Stopped)
        else {
            return;
        };
        let closed = current.closed_at(now);
        let duration = closed.duration().unwrap_or_else(Duration::zero);
        if duration <= Duration::zero() {
            debug!("Skipping empty interval at {}", closed.start);
            return;
        }
        self.session += duration;
        self.store.append(closed);
    }

    fn split_at(&mut self, now: DateTime<Utc>) {
        if self.is_tracking() {
            self.close_current(now);
            self.state = TrackingState::Tracking {
                current: open_interval(now, &self.boundary.identity),
            };
        }
    }
}

/// Closed intervals that end after `instant`.
fn ending_after(intervals: Vec<TimeInterval>, instant: DateTime<Utc>) -> Vec<TimeInterval> {
    intervals
        .into_iter()
        .filter(|v| v.end.is_some_and(|end| end > instant))
        .collect()
}

fn open_interval(start: DateTime<Utc>, identity: &WorkspaceIdentity) -> TimeInterval {
    TimeInterval::open(
        start,
        identity.workspace_label(),
        identity.repository_labels(),
    )
}
