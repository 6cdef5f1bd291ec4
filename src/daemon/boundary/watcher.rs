use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::{Config, ConfigSource},
    daemon::event::TrackerEvent,
    utils::clock::Clock,
};

use super::probe::{Boundary, WorkspaceIdentity, WorkspaceProbe};

/// Periodically re-reads the configuration and probes the workspaces, notifying the tracker about
/// configuration changes and boundary crossings.
pub struct BoundaryWatcher {
    next: mpsc::Sender<TrackerEvent>,
    probe: Box<dyn WorkspaceProbe>,
    config_source: ConfigSource,
    shutdown: CancellationToken,
    time_provider: Box<dyn Clock>,
    config: Config,
    boundary: Boundary,
}

impl BoundaryWatcher {
    /// `config` and `identity` are the ones the tracker was started with.
    pub fn new(
        next: mpsc::Sender<TrackerEvent>,
        probe: Box<dyn WorkspaceProbe>,
        config_source: ConfigSource,
        shutdown: CancellationToken,
        time_provider: Box<dyn Clock>,
        config: Config,
        identity: WorkspaceIdentity,
    ) -> Self {
        let boundary = Boundary::new(identity, config.track_git_branch);
        Self {
            next,
            probe,
            config_source,
            shutdown,
            time_provider,
            config,
            boundary,
        }
    }

    fn poll(&mut self) -> Result<Vec<TrackerEvent>> {
        let mut events = vec![];

        match self.config_source.load() {
            Ok(config) if config != self.config => {
                info!("Configuration changed");
                self.config = config.clone();
                events.push(TrackerEvent::SettingsChanged(config));
            }
            Ok(_) => {}
            Err(e) => warn!(
                "Failed to reload {:?}, keeping previous configuration: {e}",
                self.config_source.path()
            ),
        }

        let identity = self
            .probe
            .identity(&self.config.workspaces, self.config.track_git_branch)?;
        let boundary = Boundary::new(identity, self.config.track_git_branch);

        if boundary != self.boundary {
            info!("Boundary crossed {:?} -> {:?}", self.boundary, boundary);
            events.push(TrackerEvent::BoundaryCrossed(boundary.clone()));
            self.boundary = boundary;
        }

        Ok(events)
    }

    /// Executes the watcher event loop.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.time_provider.instant();
        loop {
            poll_point += self.config.poll_interval();

            match self.poll() {
                Ok(events) => {
                    for event in events {
                        let span = info_span!("Forwarding boundary event");
                        debug!("Sending message {:?}", event);
                        self.next
                            .send(event)
                            .instrument(span)
                            .await
                            .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;
                    }
                }
                Err(e) => {
                    error!("Encountered an error during probing {:?}", e)
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.time_provider.sleep_until(poll_point) => ()
            }
        }
    }
}
