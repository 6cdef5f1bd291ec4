//! Requests the cli hands to a running daemon. The request is written into the application
//! directory and the daemon is woken up with SIGHUP. It answers through another file.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::fs::operations::atomic_write;

use super::storage::entities::TimeInterval;

pub const REQUEST_FILE_NAME: &str = "request.json";
pub const RESPONSE_FILE_NAME: &str = "response.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Remove every interval of the tracked year.
    Clear,
    /// Overwrite the history of the tracked year.
    Replace { intervals: Vec<TimeInterval> },
    /// Every interval of the tracked year, the unsaved and the running ones included.
    Export,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "camelCase")]
pub enum ControlResponse {
    Done,
    Exported {
        year: i32,
        intervals: Vec<TimeInterval>,
    },
    Failed {
        message: String,
    },
}

impl ControlResponse {
    /// Turns [ControlResponse::Failed] into an error.
    pub fn into_result(self) -> Result<Self> {
        match self {
            Self::Failed { message } => Err(anyhow!("Daemon failed the request: {message}")),
            other => Ok(other),
        }
    }
}

pub fn request_path(dir: &Path) -> PathBuf {
    dir.join(REQUEST_FILE_NAME)
}

pub fn response_path(dir: &Path) -> PathBuf {
    dir.join(RESPONSE_FILE_NAME)
}

pub async fn write_message<T: Serialize>(path: &Path, message: &T) -> Result<()> {
    let data = serde_json::to_vec(message)?;
    atomic_write(path, &data)
        .await
        .with_context(|| format!("Failed to write {path:?}"))
}

/// Reads and removes a message. Returns `None` when there is none.
pub async fn take_message<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match tokio::fs::read(path).await {
        Ok(v) => v,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {path:?}")),
    };
    tokio::fs::remove_file(path).await?;
    let message = serde_json::from_slice(&data).with_context(|| format!("Malformed {path:?}"))?;
    Ok(Some(message))
}

/// Removes a message left by an earlier exchange.
pub async fn discard_message(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}
