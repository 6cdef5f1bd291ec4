use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by [PersistenceGateway](super::year_storage::PersistenceGateway).
/// Corrupted or missing files on load are not errors, they are read as empty.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read records from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write records into {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}
