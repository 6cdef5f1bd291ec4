pub mod analysis;

use std::{future, sync::Arc};

use chrono::{DateTime, Datelike, Utc};
use futures::{stream, Stream, StreamExt};
use tracing::warn;

use crate::daemon::storage::{
    crop::crop_to_range, entities::TimeInterval, year_storage::PersistenceGateway,
};

pub struct ExtractConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Partition that is read from somewhere else.
    pub exclude_year: Option<i32>,
}

impl ExtractConfig {
    fn filter(&self, entity: TimeInterval) -> Option<TimeInterval> {
        if entity.is_open() {
            // Left behind by a daemon that didn't shut down properly
            warn!("Skipping open interval starting at {}", entity.start);
            return None;
        }
        crop_to_range(&entity, self.start, self.end)
    }
}

/// Extracts [TimeInterval]s between 2 dates, cropped to the range. Yearly partitions are read
/// concurrently, but yielded in order.
pub fn extract_between(
    storage: impl PersistenceGateway,
    config: ExtractConfig,
) -> impl Stream<Item = TimeInterval> {
    let storage = Arc::new(storage);
    let exclude_year = config.exclude_year;

    let files = stream::iter(config.start.year()..=config.end.year())
        .filter(move |year| future::ready(Some(*year) != exclude_year))
        .map(move |year| {
            let storage = storage.clone();
            async move { storage.load(year).await }
        })
        .buffered(4);

    files
        .flat_map(stream::iter)
        .filter_map(move |v| future::ready(config.filter(v)))
}
