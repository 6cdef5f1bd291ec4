use std::{path::Path, time::Duration};

use anyhow::{bail, Result};
use sysinfo::Signal;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::daemon::{
    control::{
        discard_message, request_path, response_path, take_message, write_message,
        ControlRequest, ControlResponse,
    },
    storage::entities::TimeInterval,
};

use super::process::{daemon_executable, is_daemon_running, signal_daemons};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
const RESPONSE_POLL: Duration = Duration::from_millis(50);

/// Hands `request` to the running daemon and waits for the answer. Returns `None` when no daemon
/// is running, the caller then works on the record files directly.
pub async fn send_request(dir: &Path, request: &ControlRequest) -> Result<Option<ControlResponse>> {
    let daemon = daemon_executable()?;
    if !is_daemon_running(&daemon)? {
        return Ok(None);
    }

    let (request_path, response_path) = (request_path(dir), response_path(dir));
    discard_message(&response_path).await?;
    write_message(&request_path, request).await?;
    if signal_daemons(&daemon, Signal::Hangup)?.is_empty() {
        discard_message(&request_path).await?;
        bail!("Failed to wake up the daemon");
    }
    debug!("Sent {request:?}");

    let deadline = Instant::now() + RESPONSE_TIMEOUT;
    loop {
        if let Some(response) = take_message::<ControlResponse>(&response_path).await? {
            info!("Daemon answered {response:?}");
            return response.into_result().map(Some);
        }
        if Instant::now() >= deadline {
            discard_message(&request_path).await?;
            bail!("Daemon didn't answer in {RESPONSE_TIMEOUT:?}");
        }
        tokio::time::sleep(RESPONSE_POLL).await;
    }
}

/// Intervals of the year the running daemon tracks, unsaved and running ones included.
pub async fn live_partition(dir: &Path) -> Result<Option<(i32, Vec<TimeInterval>)>> {
    match send_request(dir, &ControlRequest::Export).await? {
        None => Ok(None),
        Some(ControlResponse::Exported { year, intervals }) => Ok(Some((year, intervals))),
        Some(other) => bail!("Unexpected answer to an export {other:?}"),
    }
}
