use std::{
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, io::AsyncReadExt};
use tracing::{debug, error, warn};

use crate::{fs::operations::atomic_write, utils::time::year_to_record_name};

use super::{entities::TimeInterval, error::StorageError};

/// Interface for abstracting storage of intervals. Intervals are partitioned by calendar year.
pub trait PersistenceGateway {
    /// Retrieves intervals stored for a year. A missing or corrupted partition is empty, failing
    /// to read an existing one is an error.
    fn try_load(&self, year: i32) -> impl Future<Output = Result<Vec<TimeInterval>, StorageError>>;

    /// Replaces the contents of a partition.
    fn save(
        &self,
        year: i32,
        intervals: Vec<TimeInterval>,
    ) -> impl Future<Output = Result<(), StorageError>>;

    /// Like [PersistenceGateway::try_load], but read failures are logged and treated as an empty
    /// partition. Only for readers that never write the result back.
    fn load(&self, year: i32) -> impl Future<Output = Vec<TimeInterval>> {
        async move {
            self.try_load(year).await.unwrap_or_else(|e| {
                error!("Treating partition {year} as empty: {e}");
                vec![]
            })
        }
    }
}

impl<T: Deref> PersistenceGateway for T
where
    T::Target: PersistenceGateway,
{
    fn try_load(&self, year: i32) -> impl Future<Output = Result<Vec<TimeInterval>, StorageError>> {
        self.deref().try_load(year)
    }

    fn save(
        &self,
        year: i32,
        intervals: Vec<TimeInterval>,
    ) -> impl Future<Output = Result<(), StorageError>> {
        self.deref().save(year, intervals)
    }
}

/// The main realization of [PersistenceGateway]. Each year is stored as a JSON array in its own
/// file inside `record_dir`.
pub struct YearStorage {
    record_dir: PathBuf,
}

impl YearStorage {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    pub fn path_for(&self, year: i32) -> PathBuf {
        self.record_dir.join(year_to_record_name(year))
    }

    /// Years that have a partition on the disk, ascending.
    pub fn stored_years(&self) -> Result<Vec<i32>, std::io::Error> {
        let mut years = std::fs::read_dir(&self.record_dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension()? != "json" {
                    return None;
                }
                path.file_stem()?.to_str()?.parse::<i32>().ok()
            })
            .collect::<Vec<_>>();
        years.sort_unstable();
        Ok(years)
    }

    async fn read_inner(path: &Path) -> Result<String, std::io::Error> {
        debug!("Reading {path:?}");
        let mut file = File::open(path).await?;
        file.lock_shared()?;
        let mut contents = String::new();
        let result = file.read_to_string(&mut contents).await;
        file.unlock_async().await?;
        result?;
        Ok(contents)
    }
}

impl PersistenceGateway for YearStorage {
    async fn try_load(&self, year: i32) -> Result<Vec<TimeInterval>, StorageError> {
        let path = self.path_for(year);
        let contents = match Self::read_inner(&path).await {
            Ok(v) => v,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(source) => return Err(StorageError::Read { path, source }),
        };

        match serde_json::from_str::<Vec<TimeInterval>>(&contents) {
            Ok(v) => Ok(v),
            Err(e) => {
                // The file gets overwritten on the next save.
                warn!("Records in {path:?} are corrupted, treating them as empty: {e}");
                Ok(vec![])
            }
        }
    }

    async fn save(&self, year: i32, mut intervals: Vec<TimeInterval>) -> Result<(), StorageError> {
        intervals.sort_by(TimeInterval::chronological_cmp);
        let data = serde_json::to_vec(&intervals)?;
        let path = self.path_for(year);
        atomic_write(&path, &data)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;
        debug!("Saved {} intervals into {path:?}", intervals.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{entities::TimeInterval, error::StorageError};

    use super::{PersistenceGateway, YearStorage};

    fn ms(value: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(value).unwrap()
    }

    #[tokio::test]
    async fn test_missing_year_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        assert!(storage.load(2024).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_save_sorts_and_round_trips() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        let later = TimeInterval::closed(ms(500), ms(900), "b");
        let earlier = TimeInterval::closed(ms(0), ms(100), "a")
            .with_repositories(vec!["a/main".into()]);

        storage
            .save(2024, vec![later.clone(), earlier.clone()])
            .await?;

        assert_eq!(storage.load(2024).await, vec![earlier, later]);
        assert!(storage.load(2023).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupted_file_is_empty_and_overwritten() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        std::fs::write(storage.path_for(2024), "[{\"start\": 1, \"end\"")?;

        assert!(storage.load(2024).await.is_empty());

        let interval = TimeInterval::closed(ms(0), ms(100), "a");
        storage.save(2024, vec![interval.clone()]).await?;
        assert_eq!(storage.load(2024).await, vec![interval]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_year_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        // Present, but can't be read as a file
        std::fs::create_dir(storage.path_for(2024))?;

        assert!(matches!(
            storage.try_load(2024).await,
            Err(StorageError::Read { .. })
        ));
        assert!(storage.load(2024).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_reads_files_with_legacy_workspace_key() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        std::fs::write(
            storage.path_for(2020),
            r#"[{"start":0,"end":1000,"workspace":"old"},{"start":2000,"end":3000,"workspace":"old (dev)"}]"#,
        )?;

        let loaded = storage.load(2020).await;
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].workspace_label, "old (dev)");
        Ok(())
    }

    #[tokio::test]
    async fn test_stored_years() -> Result<()> {
        let dir = tempdir()?;
        let storage = YearStorage::new(dir.path().to_owned())?;
        storage.save(2025, vec![]).await?;
        storage.save(2023, vec![]).await?;
        std::fs::write(dir.path().join("notes.txt"), "")?;

        assert_eq!(storage.stored_years()?, vec![2023, 2025]);
        Ok(())
    }
}
