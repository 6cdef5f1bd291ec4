use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::TimeZone;
use tracing::{debug, error, info, warn};

use crate::{
    config::DisplaySettings,
    daemon::{
        control::{
            request_path, response_path, take_message, write_message, ControlRequest,
            ControlResponse,
        },
        event::TrackerEvent,
        storage::{error::StorageError, year_storage::PersistenceGateway},
        tracker::{
            status::{render_status_line, status_path, write_status, StatusReport},
            Tracker,
        },
    },
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Bridges [ProcessingModule](super::ProcessingModule) and [Tracker]. After every change the
/// status report is rewritten, so the CLI always reads fresh numbers.
pub struct TrackingProcessor<G: PersistenceGateway, Tz: TimeZone> {
    tracker: Tracker<G, Tz>,
    status_path: PathBuf,
    request_path: PathBuf,
    response_path: PathBuf,
    display: DisplaySettings,
    date_provider: Box<dyn Clock>,
}

impl<G: PersistenceGateway, Tz: TimeZone> TrackingProcessor<G, Tz> {
    /// Status, requests and responses live in `dir`.
    pub fn new(
        tracker: Tracker<G, Tz>,
        dir: &Path,
        display: DisplaySettings,
        date_provider: Box<dyn Clock>,
    ) -> Self {
        Self {
            tracker,
            status_path: status_path(dir),
            request_path: request_path(dir),
            response_path: response_path(dir),
            display,
            date_provider,
        }
    }

    /// Handles the pending control request. Failures of the request itself are answered to the
    /// cli, only failing to exchange the files is an error here.
    async fn handle_control(&mut self) -> Result<()> {
        let request = match take_message::<ControlRequest>(&self.request_path).await {
            Ok(Some(v)) => v,
            Ok(None) => {
                debug!("Woken up without a control request");
                return Ok(());
            }
            Err(e) => {
                let response = ControlResponse::Failed {
                    message: format!("{e:#}"),
                };
                write_message(&self.response_path, &response).await?;
                return Err(e);
            }
        };
        info!("Handling {request:?}");

        let result = match request {
            ControlRequest::Clear => self.tracker.clear_all().await.map(|_| ControlResponse::Done),
            ControlRequest::Replace { intervals } => self
                .tracker
                .replace_all(intervals)
                .await
                .map(|_| ControlResponse::Done),
            ControlRequest::Export => Ok::<_, StorageError>(ControlResponse::Exported {
                year: self.tracker.store().year(),
                intervals: self.tracker.exportable_intervals(),
            }),
        };
        let response = result.unwrap_or_else(|e| {
            warn!("Control request failed {e:?}");
            ControlResponse::Failed {
                message: e.to_string(),
            }
        });
        write_message(&self.response_path, &response).await
    }

    async fn publish_status(&mut self) {
        let snapshot = self.tracker.snapshot();
        let report = StatusReport {
            snapshot,
            status_line: render_status_line(&snapshot, &self.display),
            current: self.tracker.current().cloned(),
            updated_at: self.date_provider.time(),
        };
        if let Err(e) = write_status(&self.status_path, &report).await {
            error!("Failed to publish status {e:?}");
        }
    }
}

impl<G: PersistenceGateway, Tz: TimeZone> EventProcessor for TrackingProcessor<G, Tz> {
    async fn process_next(&mut self, message: TrackerEvent) -> Result<()> {
        let result = match message {
            TrackerEvent::BoundaryCrossed(boundary) => {
                self.tracker.boundary_crossed(boundary);
                Ok(())
            }
            TrackerEvent::Control => {
                let result = self.handle_control().await;
                self.publish_status().await;
                return result;
            }
            TrackerEvent::SettingsChanged(config) => {
                self.tracker.set_settings(config.tracker_settings());
                self.display = config.display_settings();
                Ok(())
            }
            TrackerEvent::Toggle => self.tracker.toggle().await,
            TrackerEvent::Save => self.tracker.save().await,
        };
        self.publish_status().await;
        Ok(result?)
    }

    async fn tick(&mut self) -> Result<()> {
        let result = self.tracker.tick().await;
        self.publish_status().await;
        Ok(result?)
    }

    async fn finalize(&mut self) -> Result<()> {
        let result = self.tracker.shutdown().await;
        self.publish_status().await;
        info!("Tracker finalized");
        Ok(result?)
    }
}
