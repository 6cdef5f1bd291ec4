use chrono::{DateTime, Duration, TimeZone};
use tracing::{debug, info, instrument, warn};

use super::{
    aggregate::Aggregator,
    consolidate::consolidate,
    entities::{TimeInterval, WORKSPACE_NAME_DELIMITER},
    error::StorageError,
    invariant::check_single_open,
    year_storage::PersistenceGateway,
};

/// Owns the intervals of one yearly partition: `committed` mirrors what is on the disk, `pending`
/// holds intervals recorded since the last successful flush.
///
/// Every mutation invalidates the aggregates before returning, so reads never see stale sums.
pub struct IntervalStore<G: PersistenceGateway> {
    gateway: G,
    year: i32,
    committed: Vec<TimeInterval>,
    pending: Vec<TimeInterval>,
    aggregator: Aggregator,
}

impl<G: PersistenceGateway> IntervalStore<G> {
    /// Opens the partition of `year`. A partition that can't be read starts out empty, it is only
    /// written once a flush manages to read it.
    pub async fn open(gateway: G, year: i32) -> Self {
        let committed = gateway.load(year).await;
        check_single_open(&committed);
        debug!("Opened partition {year} with {} intervals", committed.len());
        Self {
            gateway,
            year,
            committed,
            pending: vec![],
            aggregator: Aggregator::new(WORKSPACE_NAME_DELIMITER),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn pending(&self) -> &[TimeInterval] {
        &self.pending
    }

    pub fn append(&mut self, interval: TimeInterval) {
        self.pending.push(interval);
        check_single_open(self.committed.iter().chain(&self.pending));
        self.aggregator.invalidate();
    }

    /// Committed intervals followed by pending ones. Not sorted as a whole.
    pub fn get_all(&self) -> Vec<TimeInterval> {
        self.committed
            .iter()
            .chain(&self.pending)
            .cloned()
            .collect()
    }

    /// Appends pending intervals to the partition as it currently is on the disk, so edits made to
    /// the file by other means are kept, and reloads it. When `compact` is set intervals are
    /// consolidated first.
    ///
    /// On failure pending intervals are kept, so the next flush retries them. The partition is
    /// never written when it couldn't be read, so its history isn't replaced by the pending ones.
    #[instrument(skip(self), fields(year = self.year))]
    pub async fn flush(&mut self, compact: bool) -> Result<(), StorageError> {
        let mut merged = self.gateway.try_load(self.year).await?;
        merged.extend(self.pending.iter().cloned());
        let merged = if compact { consolidate(merged) } else { merged };

        let result = self.gateway.save(self.year, merged).await;
        self.aggregator.invalidate();
        result?;

        self.pending.clear();
        self.reload().await;
        info!("Flushed partition {}", self.year);
        Ok(())
    }

    /// Removes every interval of the partition, pending ones included.
    pub async fn clear_all(&mut self) -> Result<(), StorageError> {
        self.gateway.save(self.year, vec![]).await?;
        self.pending.clear();
        self.reload().await;
        info!("Cleared partition {}", self.year);
        Ok(())
    }

    /// Overwrites the history of the partition. Intervals recorded since the last flush are kept on
    /// top of the replacement.
    pub async fn replace_all(&mut self, intervals: Vec<TimeInterval>) -> Result<(), StorageError> {
        let merged = intervals
            .into_iter()
            .chain(self.pending.iter().cloned())
            .collect::<Vec<_>>();
        check_single_open(&merged);

        self.gateway.save(self.year, merged).await?;
        self.pending.clear();
        self.reload().await;
        info!("Replaced partition {}", self.year);
        Ok(())
    }

    /// Flushes into the current partition and switches to another one.
    pub async fn reopen(&mut self, year: i32, compact: bool) -> Result<(), StorageError> {
        self.flush(compact).await?;
        self.year = year;
        self.reload().await;
        info!("Switched to partition {year}");
        Ok(())
    }

    /// Keeps the previous intervals when the partition can't be read.
    async fn reload(&mut self) {
        match self.gateway.try_load(self.year).await {
            Ok(committed) => {
                check_single_open(&committed);
                self.committed = committed;
            }
            Err(e) => warn!("Keeping intervals of {} in memory: {e}", self.year),
        }
        self.aggregator.invalidate();
    }

    pub fn total_duration(&mut self) -> Duration {
        let (committed, pending) = (&self.committed, &self.pending);
        self.aggregator.total(|| committed.iter().chain(pending))
    }

    pub fn total_by_label(&mut self, label: &str) -> Duration {
        let (committed, pending) = (&self.committed, &self.pending);
        self.aggregator
            .total_by_label(label, || committed.iter().chain(pending))
    }

    pub fn today_duration<Tz: TimeZone>(
        &mut self,
        open_interval: Option<&TimeInterval>,
        now: &DateTime<Tz>,
    ) -> Duration {
        let (committed, pending) = (&self.committed, &self.pending);
        self.aggregator
            .today(|| committed.iter().chain(pending), open_interval, now)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        cell::{Cell, RefCell},
        collections::HashMap,
    };

    use anyhow::Result;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        entities::TimeInterval,
        error::StorageError,
        year_storage::{PersistenceGateway, YearStorage},
    };

    use super::IntervalStore;

    /// In-memory gateway that can be told to fail reads and writes.
    #[derive(Default)]
    pub(crate) struct MemoryGateway {
        pub years: RefCell<HashMap<i32, Vec<TimeInterval>>>,
        pub fail_loads: Cell<bool>,
        pub fail_saves: Cell<bool>,
        pub saves: Cell<usize>,
    }

    impl PersistenceGateway for MemoryGateway {
        async fn try_load(&self, year: i32) -> Result<Vec<TimeInterval>, StorageError> {
            if self.fail_loads.get() {
                return Err(StorageError::Read {
                    path: format!("{year}.json").into(),
                    source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
                });
            }
            Ok(self.years.borrow().get(&year).cloned().unwrap_or_default())
        }

        async fn save(&self, year: i32, intervals: Vec<TimeInterval>) -> Result<(), StorageError> {
            if self.fail_saves.get() {
                return Err(StorageError::Io {
                    path: format!("{year}.json").into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.saves.set(self.saves.get() + 1);
            self.years.borrow_mut().insert(year, intervals);
            Ok(())
        }
    }

    fn ms(value: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(value).unwrap()
    }

    fn interval(start: i64, end: i64, label: &str) -> TimeInterval {
        TimeInterval::closed(ms(start), ms(end), label)
    }

    #[tokio::test]
    async fn test_get_all_is_committed_then_pending() -> Result<()> {
        let gateway = MemoryGateway::default();
        gateway
            .years
            .borrow_mut()
            .insert(2024, vec![interval(500, 600, "a")]);
        let mut store = IntervalStore::open(&gateway, 2024).await;

        store.append(interval(0, 100, "b"));

        assert_eq!(
            store.get_all(),
            vec![interval(500, 600, "a"), interval(0, 100, "b")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_append_invalidates_totals() -> Result<()> {
        let gateway = MemoryGateway::default();
        let mut store = IntervalStore::open(&gateway, 2024).await;

        store.append(interval(0, 1000, "a"));
        assert_eq!(store.total_duration(), Duration::seconds(1));
        assert_eq!(store.total_by_label("a"), Duration::seconds(1));

        store.append(interval(5000, 7000, "a"));
        assert_eq!(store.total_duration(), Duration::seconds(3));
        assert_eq!(store.total_by_label("a"), Duration::seconds(3));
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_moves_pending_into_committed() -> Result<()> {
        let gateway = MemoryGateway::default();
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(50, 150, "a"));
        store.append(interval(0, 100, "a"));

        store.flush(false).await?;

        assert!(store.pending().is_empty());
        assert_eq!(
            gateway.years.borrow()[&2024],
            vec![interval(50, 150, "a"), interval(0, 100, "a")]
        );
        assert_eq!(store.get_all().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_compacting_flush_consolidates() -> Result<()> {
        let gateway = MemoryGateway::default();
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(50, 150, "a"));
        store.append(interval(0, 100, "a"));
        assert_eq!(store.total_duration(), Duration::milliseconds(200));

        store.flush(true).await?;

        assert_eq!(store.get_all(), vec![interval(0, 150, "a")]);
        assert_eq!(store.total_duration(), Duration::milliseconds(150));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_pending() -> Result<()> {
        let gateway = MemoryGateway::default();
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(0, 100, "a"));

        gateway.fail_saves.set(true);
        assert!(matches!(
            store.flush(false).await,
            Err(StorageError::Io { .. })
        ));
        assert_eq!(store.pending(), &[interval(0, 100, "a")]);

        gateway.fail_saves.set(false);
        store.flush(false).await?;
        assert!(store.pending().is_empty());
        assert_eq!(gateway.years.borrow()[&2024], vec![interval(0, 100, "a")]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_partition_is_not_overwritten() -> Result<()> {
        let gateway = MemoryGateway::default();
        gateway
            .years
            .borrow_mut()
            .insert(2024, vec![interval(0, 100, "a")]);
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(200, 300, "b"));

        gateway.fail_loads.set(true);
        assert!(matches!(
            store.flush(false).await,
            Err(StorageError::Read { .. })
        ));
        assert_eq!(gateway.saves.get(), 0);
        assert_eq!(gateway.years.borrow()[&2024], vec![interval(0, 100, "a")]);
        assert_eq!(store.pending(), &[interval(200, 300, "b")]);

        gateway.fail_loads.set(false);
        store.flush(false).await?;
        assert_eq!(
            gateway.years.borrow()[&2024],
            vec![interval(0, 100, "a"), interval(200, 300, "b")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_flush_keeps_external_edits() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        let mut store = IntervalStore::open(&storage, 2024).await;
        store.append(interval(0, 100, "a"));
        store.flush(false).await?;

        // Someone edits the file by hand between flushes
        storage
            .save(2024, vec![interval(0, 100, "renamed")])
            .await?;
        store.append(interval(200, 300, "a"));
        store.flush(false).await?;

        assert_eq!(
            store.get_all(),
            vec![interval(0, 100, "renamed"), interval(200, 300, "a")]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_all_empties_everything() -> Result<()> {
        let gateway = MemoryGateway::default();
        gateway
            .years
            .borrow_mut()
            .insert(2024, vec![interval(0, 100, "a")]);
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(200, 300, "a"));
        assert_eq!(store.total_duration(), Duration::milliseconds(200));

        store.clear_all().await?;

        assert!(store.get_all().is_empty());
        assert_eq!(store.total_duration(), Duration::zero());
        assert!(gateway.years.borrow()[&2024].is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_all_keeps_pending_on_top() -> Result<()> {
        let gateway = MemoryGateway::default();
        gateway
            .years
            .borrow_mut()
            .insert(2024, vec![interval(0, 100, "a")]);
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(200, 300, "a"));

        store
            .replace_all(vec![interval(0, 50, "edited")])
            .await?;

        assert!(store.pending().is_empty());
        assert_eq!(
            gateway.years.borrow()[&2024],
            vec![interval(0, 50, "edited"), interval(200, 300, "a")]
        );
        assert_eq!(store.total_by_label("edited"), Duration::milliseconds(50));
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_switches_partition() -> Result<()> {
        let gateway = MemoryGateway::default();
        gateway
            .years
            .borrow_mut()
            .insert(2025, vec![interval(1000, 2000, "new")]);
        let mut store = IntervalStore::open(&gateway, 2024).await;
        store.append(interval(0, 100, "old"));

        store.reopen(2025, false).await?;

        assert_eq!(store.year(), 2025);
        assert_eq!(gateway.years.borrow()[&2024], vec![interval(0, 100, "old")]);
        assert_eq!(store.get_all(), vec![interval(1000, 2000, "new")]);
        assert_eq!(store.total_duration(), Duration::seconds(1));
        Ok(())
    }

    #[tokio::test]
    async fn test_today_reads_through_store() -> Result<()> {
        let gateway = MemoryGateway::default();
        let mut store = IntervalStore::open(&gateway, 2024).await;
        let yesterday_late = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
        let today_early = Utc.with_ymd_and_hms(2024, 3, 10, 1, 0, 0).unwrap();
        store.append(TimeInterval::closed(yesterday_late, today_early, "A"));

        assert_eq!(store.today_duration(None, &today_early), Duration::hours(1));

        store.append(TimeInterval::closed(
            today_early,
            today_early + Duration::minutes(30),
            "A",
        ));
        assert_eq!(
            store.today_duration(None, &(today_early + Duration::hours(1))),
            Duration::minutes(90)
        );
        Ok(())
    }
}
